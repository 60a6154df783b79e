use thiserror::Error;

/// Error type for loading, configuration and analysis operations.
///
/// Per-record data problems (unparseable values, missing units) are never
/// reported through this type; they become anomaly reasons on the record.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Required columns are missing from an input table
    #[error("SchemaError: missing required columns: {}", missing.join(", "))]
    Schema { missing: Vec<String> },

    /// Validation errors (e.g., invalid contamination, empty feature matrix)
    #[error("ValidationError: {0}")]
    ValidationError(String),

    /// Arrow-related errors (parsing, schema mismatch)
    #[error("ArrowError: {0}")]
    ArrowError(String),

    /// Model training/scoring errors
    #[error("ModelError: {0}")]
    ModelError(String),

    /// Engine configuration or unit table errors
    #[error("ConfigError: {0}")]
    ConfigError(String),

    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),

    #[error("CsvError: {0}")]
    Csv(#[from] csv::Error),

    #[error("JsonError: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TomlError: {0}")]
    Toml(#[from] toml::de::Error),
}

impl AnalysisError {
    /// Build a schema error from the names of the missing columns
    pub fn missing_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AnalysisError::Schema {
            missing: columns.into_iter().map(Into::into).collect(),
        }
    }
}
