//! Group averages and the controlled-anomaly tolerance band

use serde::{Deserialize, Serialize};

use crate::stats::Statistics;

/// Expected value range of a group, reported next to its anomalies
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupAggregate {
    pub average: Option<f64>,
    pub median: Option<f64>,
}

impl GroupAggregate {
    /// Average and median over the group's numeric values, populated only
    /// when the outlier detector flagged something in the group
    pub fn for_group(numeric_values: &[f64], has_forest_outlier: bool) -> Self {
        if !has_forest_outlier {
            return Self::default();
        }
        match Statistics::from_values(numeric_values) {
            Some(stats) => Self {
                average: Some(stats.mean),
                median: Some(stats.median),
            },
            None => Self::default(),
        }
    }
}

/// `-tolerance <= average - value <= tolerance`; false when either side is absent
pub fn is_controlled(average: Option<f64>, value: Option<f64>, tolerance: f64) -> bool {
    match (average, value) {
        (Some(average), Some(value)) => (average - value).abs() <= tolerance,
        _ => false,
    }
}
