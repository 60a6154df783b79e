//! Unit plausibility table and validator

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use tracing::warn;

use crate::utils::AnalysisError;

const BUILTIN_TABLE: &str = include_str!("../../config/valid_units.toml");

#[derive(Debug, Deserialize)]
struct TableFile {
    #[serde(default)]
    measurement: Vec<MeasurementEntry>,
}

#[derive(Debug, Deserialize)]
struct MeasurementEntry {
    keyword: String,
    #[serde(default)]
    units: Vec<String>,
}

/// Problems found while canonicalising a unit table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableDiagnostic {
    /// Keyword repeated with an identical unit set
    Duplicate { keyword: String },
    /// Keyword repeated with a different unit set; the sets were merged
    Conflicting { keyword: String, merged: Vec<String> },
}

impl fmt::Display for TableDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableDiagnostic::Duplicate { keyword } => {
                write!(f, "duplicate unit keyword '{}'", keyword)
            }
            TableDiagnostic::Conflicting { keyword, merged } => write!(
                f,
                "conflicting unit keyword '{}', merged units: {:?}",
                keyword, merged
            ),
        }
    }
}

/// Keyword to allowed-unit mapping, canonicalised to lower case
#[derive(Debug, Clone, Default)]
pub struct ValidUnitTable {
    entries: BTreeMap<String, BTreeSet<String>>,
    diagnostics: Vec<TableDiagnostic>,
}

impl ValidUnitTable {
    /// The table shipped with the crate
    pub fn builtin() -> Result<Self, AnalysisError> {
        Self::from_toml_str(BUILTIN_TABLE)
    }

    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse a `[[measurement]]` table, merging repeated keywords
    pub fn from_toml_str(content: &str) -> Result<Self, AnalysisError> {
        let file: TableFile = toml::from_str(content)?;
        if file.measurement.is_empty() {
            return Err(AnalysisError::ConfigError(
                "unit table has no [[measurement]] entries".to_string(),
            ));
        }
        Self::from_entries(file.measurement.into_iter().map(|m| (m.keyword, m.units)))
    }

    pub fn from_entries<I, K, U, S>(entries: I) -> Result<Self, AnalysisError>
    where
        I: IntoIterator<Item = (K, U)>,
        K: AsRef<str>,
        U: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = ValidUnitTable::default();

        for (keyword, units) in entries {
            let keyword = keyword.as_ref().trim().to_lowercase();
            if keyword.is_empty() {
                return Err(AnalysisError::ConfigError(
                    "unit table keyword must not be empty".to_string(),
                ));
            }
            // Tokens are not trimmed: "" and " " are meaningful
            let units: BTreeSet<String> =
                units.into_iter().map(|u| u.as_ref().to_lowercase()).collect();

            match table.entries.get_mut(&keyword) {
                None => {
                    table.entries.insert(keyword, units);
                }
                Some(existing) if *existing == units => {
                    let diagnostic = TableDiagnostic::Duplicate { keyword };
                    warn!("{}", diagnostic);
                    table.diagnostics.push(diagnostic);
                }
                Some(existing) => {
                    existing.extend(units);
                    let diagnostic = TableDiagnostic::Conflicting {
                        merged: existing.iter().cloned().collect(),
                        keyword,
                    };
                    warn!("{}", diagnostic);
                    table.diagnostics.push(diagnostic);
                }
            }
        }

        Ok(table)
    }

    pub fn diagnostics(&self) -> &[TableDiagnostic] {
        &self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Allowed tokens for a keyword (any casing)
    pub fn units_for(&self, keyword: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(&keyword.trim().to_lowercase())
    }

    /// Keywords contained in the feature name
    pub fn matching_keywords<'a>(&'a self, feature: &str) -> Vec<&'a str> {
        let feature = feature.to_lowercase();
        self.entries
            .keys()
            .filter(|keyword| feature.contains(keyword.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// Whether `unit` is plausible for a measurement called `feature`
    ///
    /// Absent or blank units are never valid. Compound units (`"V|mV"`) are
    /// valid when any part matches.
    pub fn validate_unit(&self, unit: Option<&str>, feature: &str) -> bool {
        let unit = match unit {
            Some(u) if !u.trim().is_empty() => u.to_lowercase(),
            _ => return false,
        };

        let feature = feature.to_lowercase();
        let allowed: Vec<&BTreeSet<String>> = self
            .entries
            .iter()
            .filter(|(keyword, _)| feature.contains(keyword.as_str()))
            .map(|(_, units)| units)
            .collect();
        if allowed.is_empty() {
            return false;
        }

        unit.split('|').map(str::trim).any(|part| {
            allowed
                .iter()
                .any(|units| units.iter().any(|token| part.contains(token.as_str())))
        })
    }
}
