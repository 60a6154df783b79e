//! Annotated outputs of the detection and validation runs, plus CSV/JSON
//! writers for them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use crate::config::ColumnNames;
use crate::insight_core::reason::join_reasons;
use crate::insight_core::{AnomalyReason, ReferenceStats, ValidationStatus};

/// Reason text for unflagged detection rows
pub const NO_ANOMALY: &str = "No anomaly";
/// Reason text for unflagged validation rows
pub const NO_ISSUES: &str = "No issues found";

/// A record with every annotation the detection pipeline produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedRecord {
    pub family: String,
    pub feature: String,
    pub value_id: Option<String>,
    pub value: Option<String>,
    pub numeric_value: Option<f64>,
    pub unit: Option<String>,
    pub average: Option<f64>,
    pub median: Option<f64>,
    pub group_key: String,
    pub is_numeric: bool,
    pub is_numeric_like: bool,
    /// Isolation score when the group was scored
    pub isolation_score: Option<f64>,
    pub anomaly: bool,
    pub anomaly_reasons: Vec<AnomalyReason>,
    pub controlled: bool,
}

impl AnnotatedRecord {
    /// Flagged and not suppressed by the tolerance band
    pub fn is_reported(&self) -> bool {
        self.anomaly && !self.controlled
    }

    pub fn reason_text(&self) -> String {
        join_reasons(&self.anomaly_reasons, NO_ANOMALY)
    }
}

fn opt_num(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn opt_str(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionSummary {
    /// Rows in the input table, before dropping incomplete ones
    pub total_rows: usize,
    pub dropped_rows: usize,
    pub analysed_rows: usize,
    pub flagged: usize,
    pub controlled: usize,
    pub reported: usize,
    pub unique_families: usize,
    pub unique_features: usize,
    pub reason_counts: BTreeMap<AnomalyReason, usize>,
}

/// Output of a detection run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    pub summary: DetectionSummary,
    /// Every analysed record, in input order
    pub records: Vec<AnnotatedRecord>,
}

impl DetectionReport {
    pub(crate) fn new(records: Vec<AnnotatedRecord>, dropped_rows: usize) -> Self {
        let mut summary = DetectionSummary {
            total_rows: records.len() + dropped_rows,
            dropped_rows,
            analysed_rows: records.len(),
            ..DetectionSummary::default()
        };

        let mut families = BTreeSet::new();
        let mut features = BTreeSet::new();
        for record in &records {
            if record.anomaly {
                summary.flagged += 1;
            }
            if record.anomaly && record.controlled {
                summary.controlled += 1;
            }
            if record.is_reported() {
                summary.reported += 1;
                families.insert(record.family.as_str());
                features.insert(record.feature.as_str());
                for reason in &record.anomaly_reasons {
                    *summary.reason_counts.entry(*reason).or_default() += 1;
                }
            }
        }
        summary.unique_families = families.len();
        summary.unique_features = features.len();

        Self { summary, records }
    }

    /// The reported anomalies: flagged and not controlled
    pub fn anomalies(&self) -> impl Iterator<Item = &AnnotatedRecord> {
        self.records.iter().filter(|r| r.is_reported())
    }

    /// Write the reported anomalies as CSV
    pub fn write_csv<W: Write>(&self, writer: W, columns: &ColumnNames) -> crate::Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record([
            columns.family.as_str(),
            columns.feature.as_str(),
            columns.value_id.as_str(),
            columns.value.as_str(),
            "VALUE_NUMERIC",
            columns.unit.as_str(),
            "AVERAGE",
            "MEDIAN",
            "GROUP",
            "ANOMALY",
            "ANOMALY_REASON",
        ])?;

        for r in self.anomalies() {
            csv.write_record([
                r.family.as_str(),
                r.feature.as_str(),
                opt_str(&r.value_id),
                opt_str(&r.value),
                opt_num(r.numeric_value).as_str(),
                opt_str(&r.unit),
                opt_num(r.average).as_str(),
                opt_num(r.median).as_str(),
                r.group_key.as_str(),
                if r.anomaly { "true" } else { "false" },
                r.reason_text().as_str(),
            ])?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Summary plus reported anomalies as pretty JSON
    pub fn to_json(&self) -> crate::Result<String> {
        #[derive(Serialize)]
        struct Output<'a> {
            summary: &'a DetectionSummary,
            anomalies: Vec<&'a AnnotatedRecord>,
        }
        let output = Output {
            summary: &self.summary,
            anomalies: self.anomalies().collect(),
        };
        Ok(serde_json::to_string_pretty(&output)?)
    }
}

/// A new record after baseline validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedRecord {
    pub family: String,
    pub feature: String,
    pub value_id: Option<String>,
    pub value: Option<String>,
    pub numeric_value: Option<f64>,
    pub unit: Option<String>,
    pub group_key: String,
    pub anomaly: bool,
    pub anomaly_reasons: Vec<AnomalyReason>,
    pub validation_status: ValidationStatus,
    pub reference_mean: Option<f64>,
    pub reference_stddev: Option<f64>,
    pub reference_count: usize,
}

impl ValidatedRecord {
    pub fn reason_text(&self) -> String {
        join_reasons(&self.anomaly_reasons, NO_ISSUES)
    }

    pub(crate) fn set_reference(&mut self, reference: Option<ReferenceStats>) {
        self.reference_mean = reference.map(|s| s.mean);
        self.reference_stddev = reference.and_then(|s| s.std_dev);
        self.reference_count = reference.map_or(0, |s| s.count);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total_rows: usize,
    pub dropped_rows: usize,
    pub analysed_rows: usize,
    pub issues: usize,
    pub status_counts: BTreeMap<ValidationStatus, usize>,
}

/// Output of a baseline validation run; every evaluated record is kept
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub summary: ValidationSummary,
    pub records: Vec<ValidatedRecord>,
}

impl ValidationReport {
    pub(crate) fn new(records: Vec<ValidatedRecord>, dropped_rows: usize) -> Self {
        let mut summary = ValidationSummary {
            total_rows: records.len() + dropped_rows,
            dropped_rows,
            analysed_rows: records.len(),
            ..ValidationSummary::default()
        };
        for record in &records {
            if record.anomaly {
                summary.issues += 1;
            }
            *summary
                .status_counts
                .entry(record.validation_status)
                .or_default() += 1;
        }
        Self { summary, records }
    }

    pub fn count(&self, status: ValidationStatus) -> usize {
        self.summary.status_counts.get(&status).copied().unwrap_or(0)
    }

    pub fn write_csv<W: Write>(&self, writer: W, columns: &ColumnNames) -> crate::Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record([
            columns.family.as_str(),
            columns.feature.as_str(),
            columns.value_id.as_str(),
            columns.value.as_str(),
            "VALUE_NUMERIC",
            columns.unit.as_str(),
            "GROUP",
            "ANOMALY",
            "ANOMALY_REASON",
            "VALIDATION_STATUS",
            "REFERENCE_MEAN",
            "REFERENCE_STDDEV",
            "REFERENCE_COUNT",
        ])?;

        for r in &self.records {
            csv.write_record([
                r.family.as_str(),
                r.feature.as_str(),
                opt_str(&r.value_id),
                opt_str(&r.value),
                opt_num(r.numeric_value).as_str(),
                opt_str(&r.unit),
                r.group_key.as_str(),
                if r.anomaly { "true" } else { "false" },
                r.reason_text().as_str(),
                r.validation_status.as_str(),
                opt_num(r.reference_mean).as_str(),
                opt_num(r.reference_stddev).as_str(),
                r.reference_count.to_string().as_str(),
            ])?;
        }
        csv.flush()?;
        Ok(())
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
