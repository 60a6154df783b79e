use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a record was flagged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyReason {
    InvalidUnit,
    IsolationForestOutlier,
    MajorityNumericValueNonNumeric,
    MajorityNonNumericValueNumeric,
    NonNumericWithoutAllowedCharacters,
    GroupNotFoundInReference,
    OutlierVsReference,
}

impl AnomalyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyReason::InvalidUnit => "Invalid unit for measurement",
            AnomalyReason::IsolationForestOutlier => "Isolation forest outlier",
            AnomalyReason::MajorityNumericValueNonNumeric => {
                "Majority numeric but value non-numeric"
            }
            AnomalyReason::MajorityNonNumericValueNumeric => {
                "Majority non-numeric but value numeric"
            }
            AnomalyReason::NonNumericWithoutAllowedCharacters => {
                "Non-numeric value without allowed characters"
            }
            AnomalyReason::GroupNotFoundInReference => "Group not found in reference",
            AnomalyReason::OutlierVsReference => "Outlier vs reference",
        }
    }
}

impl fmt::Display for AnomalyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-record anomaly flag and ordered reasons
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub anomaly: bool,
    pub reasons: Vec<AnomalyReason>,
}

impl Annotation {
    pub fn flag(&mut self, reason: AnomalyReason) {
        self.anomaly = true;
        self.reasons.push(reason);
    }

    pub fn has(&self, reason: AnomalyReason) -> bool {
        self.reasons.contains(&reason)
    }

    pub fn reason_text(&self, empty: &str) -> String {
        join_reasons(&self.reasons, empty)
    }
}

/// Reasons joined with `"; "`, or `empty` when there are none
pub fn join_reasons(reasons: &[AnomalyReason], empty: &str) -> String {
    if reasons.is_empty() {
        return empty.to_string();
    }
    reasons
        .iter()
        .map(AnomalyReason::as_str)
        .collect::<Vec<_>>()
        .join("; ")
}
