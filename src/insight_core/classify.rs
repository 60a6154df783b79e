//! Numeric classification of raw measurement values
//!
//! Two predicates are computed per value. `is_numeric` is a strict parse.
//! `is_numeric_like` also accepts composite notations (ranges such as `1/2`,
//! tolerance lists such as `1|2|3`, `10 to 20`) and drives family majority
//! voting. The same marker set is what makes a non-numeric value an
//! acceptable notation for the format check.

use serde::{Deserialize, Serialize};

/// Substrings that mark a composite or range notation
pub const COMPOSITE_MARKERS: [&str; 5] = ["|", "/", "to", "!", " "];

/// Derived numeric view of a raw value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueClass {
    pub numeric_value: Option<f64>,
    pub is_numeric: bool,
    pub is_numeric_like: bool,
}

impl ValueClass {
    pub fn of(raw: Option<&str>) -> Self {
        let numeric_value = raw.and_then(parse_numeric);
        let is_numeric = numeric_value.is_some();
        Self {
            numeric_value,
            is_numeric,
            is_numeric_like: is_numeric || raw.is_some_and(has_composite_marker),
        }
    }
}

/// Strict parse: trimmed text that is a finite floating-point number
pub fn parse_numeric(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn has_composite_marker(raw: &str) -> bool {
    COMPOSITE_MARKERS.iter().any(|marker| raw.contains(marker))
}

/// True when a value is neither a float nor a composite notation.
/// Absent values are always anomalous.
pub fn is_non_numeric_format_anomaly(raw: Option<&str>) -> bool {
    match raw {
        None => true,
        Some(value) => !has_composite_marker(value) && value.trim().parse::<f64>().is_err(),
    }
}
