//! Reference baseline built from a trusted dataset, and the per-record
//! comparison used when validating newly submitted values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::insight_core::classify::parse_numeric;
use crate::record::Record;
use crate::stats::Statistics;

/// Numeric summary of one reference group
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceStats {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; absent with a single reference value
    pub std_dev: Option<f64>,
}

/// A group seen in the reference dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupBaseline {
    /// Reference rows in the group, numeric or not
    pub record_count: usize,
    /// Absent when none of the group's reference values is numeric
    pub stats: Option<ReferenceStats>,
}

/// Per-group reference statistics; read-only once built
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceBaseline {
    groups: BTreeMap<String, GroupBaseline>,
}

impl ReferenceBaseline {
    /// Build the baseline from reference records
    pub fn from_records(records: &[Record]) -> Self {
        let mut values: BTreeMap<String, (usize, Vec<f64>)> = BTreeMap::new();
        for record in records {
            let entry = values.entry(record.group_key()).or_default();
            entry.0 += 1;
            if let Some(v) = record.raw_value.as_deref().and_then(parse_numeric) {
                entry.1.push(v);
            }
        }

        let groups = values
            .into_iter()
            .map(|(key, (record_count, numeric))| {
                let stats = Statistics::from_values(&numeric).map(|s| ReferenceStats {
                    count: s.count,
                    mean: s.mean,
                    std_dev: s.std_dev,
                });
                (key, GroupBaseline { record_count, stats })
            })
            .collect();

        Self { groups }
    }

    /// Add or replace a group directly
    pub fn insert(&mut self, group_key: impl Into<String>, group: GroupBaseline) {
        self.groups.insert(group_key.into(), group);
    }

    pub fn get(&self, group_key: &str) -> Option<&GroupBaseline> {
        self.groups.get(group_key)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Compare one new value against its group's reference statistics
    ///
    /// A value is an outlier when `|value - mean| > sigma * std_dev`.
    pub fn compare(&self, group_key: &str, value: Option<f64>, sigma: f64) -> BaselineOutcome {
        let Some(group) = self.get(group_key) else {
            return BaselineOutcome::NotFound;
        };
        let (Some(stats), Some(value)) = (group.stats, value) else {
            return BaselineOutcome::NoReference;
        };

        match stats.std_dev {
            Some(std_dev) if (value - stats.mean).abs() > sigma * std_dev => {
                BaselineOutcome::Outlier(stats)
            }
            _ => BaselineOutcome::Within(stats),
        }
    }
}

/// Result of comparing a value against the reference baseline
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BaselineOutcome {
    /// Group never occurs in the reference dataset
    NotFound,
    /// Group exists but there is nothing numeric to compare
    NoReference,
    Within(ReferenceStats),
    Outlier(ReferenceStats),
}

impl BaselineOutcome {
    pub fn reference(&self) -> Option<ReferenceStats> {
        match self {
            BaselineOutcome::Within(stats) | BaselineOutcome::Outlier(stats) => Some(*stats),
            BaselineOutcome::NotFound | BaselineOutcome::NoReference => None,
        }
    }
}

/// Outcome of validating a new record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Valid,
    Invalid,
    Outlier,
    NotFound,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Valid => "valid",
            ValidationStatus::Invalid => "invalid",
            ValidationStatus::Outlier => "outlier",
            ValidationStatus::NotFound => "not_found",
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline_with(mean: f64, std_dev: Option<f64>) -> ReferenceBaseline {
        let mut baseline = ReferenceBaseline::default();
        baseline.insert(
            "Caps_Capacitance",
            GroupBaseline {
                record_count: 20,
                stats: Some(ReferenceStats {
                    count: 20,
                    mean,
                    std_dev,
                }),
            },
        );
        baseline
    }

    #[test]
    fn test_from_records() {
        let records = vec![
            Record::new("Caps", "Capacitance", "10", "uF"),
            Record::new("Caps", "Capacitance", "20", "uF"),
            Record::new("Caps", "Capacitance", "1/2", "uF"),
            Record::new("Caps", "Color", "Blue", "-"),
        ];
        let baseline = ReferenceBaseline::from_records(&records);

        assert_eq!(baseline.len(), 2);
        let caps = baseline.get("Caps_Capacitance").unwrap();
        assert_eq!(caps.record_count, 3);
        let stats = caps.stats.unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean, 15.0);
        assert!((stats.std_dev.unwrap() - 7.071_067_811_865_476).abs() < 1e-9);

        let color = baseline.get("Caps_Color").unwrap();
        assert_eq!(color.record_count, 1);
        assert!(color.stats.is_none());
    }

    #[test]
    fn test_compare_outlier() {
        let baseline = baseline_with(10.0, Some(2.0));
        assert!(matches!(
            baseline.compare("Caps_Capacitance", Some(50.0), 3.0),
            BaselineOutcome::Outlier(_)
        ));
        assert!(matches!(
            baseline.compare("Caps_Capacitance", Some(15.0), 3.0),
            BaselineOutcome::Within(_)
        ));
        // Exactly at the band edge is not an outlier
        assert!(matches!(
            baseline.compare("Caps_Capacitance", Some(16.0), 3.0),
            BaselineOutcome::Within(_)
        ));
    }

    #[test]
    fn test_compare_not_found_regardless_of_value() {
        let baseline = baseline_with(10.0, Some(2.0));
        assert_eq!(baseline.compare("Other_Group", Some(10.0), 3.0), BaselineOutcome::NotFound);
        assert_eq!(baseline.compare("Other_Group", None, 3.0), BaselineOutcome::NotFound);
    }

    #[test]
    fn test_compare_without_numeric_value() {
        let baseline = baseline_with(10.0, Some(2.0));
        assert_eq!(
            baseline.compare("Caps_Capacitance", None, 3.0),
            BaselineOutcome::NoReference
        );
    }

    #[test]
    fn test_single_reference_value_never_outlier() {
        let baseline = baseline_with(10.0, None);
        let outcome = baseline.compare("Caps_Capacitance", Some(1e6), 3.0);
        assert!(matches!(outcome, BaselineOutcome::Within(_)));
        assert_eq!(outcome.reference().unwrap().mean, 10.0);
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(ValidationStatus::NotFound.to_string(), "not_found");
        assert_eq!(
            serde_json::to_string(&ValidationStatus::Outlier).unwrap(),
            "\"outlier\""
        );
    }
}
