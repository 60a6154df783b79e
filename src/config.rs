//! Engine configuration loaded from TOML
//!
//! Every field has a default, so a config file only needs the keys it
//! overrides:
//!
//! ```toml
//! controlled_tolerance = 25.0
//!
//! [forest]
//! seed = 7
//!
//! [columns]
//! family = "part_family"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::insight_core::model::ForestOptions;
use crate::utils::{validate_contamination, AnalysisError};

/// Default absolute band around the group average inside which flags are suppressed
pub const DEFAULT_CONTROLLED_TOLERANCE: f64 = 50.0;
/// Default number of reference standard deviations before a new value is an outlier
pub const DEFAULT_OUTLIER_SIGMA: f64 = 3.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Records with `|group_average - value| <= controlled_tolerance` are controlled
    pub controlled_tolerance: f64,
    /// Baseline comparison threshold in reference standard deviations
    pub outlier_sigma: f64,
    /// Optional valid-unit table; the embedded table is used when absent
    pub units_path: Option<PathBuf>,
    pub forest: ForestOptions,
    pub columns: ColumnNames,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            controlled_tolerance: DEFAULT_CONTROLLED_TOLERANCE,
            outlier_sigma: DEFAULT_OUTLIER_SIGMA,
            units_path: None,
            forest: ForestOptions::default(),
            columns: ColumnNames::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, AnalysisError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;

        // Relative unit table paths resolve against the config file's folder
        if let (Some(units), Some(dir)) = (config.units_path.as_ref(), path.parent()) {
            if units.is_relative() {
                config.units_path = Some(dir.join(units));
            }
        }
        Ok(config)
    }

    /// Reject parameter values the engine cannot work with
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !(self.controlled_tolerance.is_finite() && self.controlled_tolerance >= 0.0) {
            return Err(AnalysisError::ConfigError(format!(
                "controlled_tolerance must be a non-negative number, got {}",
                self.controlled_tolerance
            )));
        }
        if !(self.outlier_sigma.is_finite() && self.outlier_sigma > 0.0) {
            return Err(AnalysisError::ConfigError(format!(
                "outlier_sigma must be positive, got {}",
                self.outlier_sigma
            )));
        }
        validate_contamination(self.forest.contamination)
            .map_err(|e| AnalysisError::ConfigError(e.to_string()))?;
        if self.forest.n_trees == 0 {
            return Err(AnalysisError::ConfigError(
                "forest.n_trees must be > 0".to_string(),
            ));
        }
        if self.forest.max_samples < 2 {
            return Err(AnalysisError::ConfigError(
                "forest.max_samples must be >= 2".to_string(),
            ));
        }
        self.columns.validate()
    }
}

/// Input column names, matched case-insensitively against table headers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub family: String,
    pub feature: String,
    pub value_id: String,
    pub value: String,
    pub unit: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            family: "PL_NAME".to_string(),
            feature: "FET_NAME".to_string(),
            value_id: "VALUE_ID".to_string(),
            value: "VALUE".to_string(),
            unit: "UNIT".to_string(),
        }
    }
}

impl ColumnNames {
    fn validate(&self) -> Result<(), AnalysisError> {
        for (key, name) in [
            ("family", &self.family),
            ("feature", &self.feature),
            ("value_id", &self.value_id),
            ("value", &self.value),
            ("unit", &self.unit),
        ] {
            if name.trim().is_empty() {
                return Err(AnalysisError::ConfigError(format!(
                    "columns.{} must not be empty",
                    key
                )));
            }
        }
        Ok(())
    }
}
