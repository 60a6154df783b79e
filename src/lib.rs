//! Parametric QA Engine - anomaly detection for electronic component
//! parametric data
//!
//! This library checks `(family, feature, value, unit)` records for
//! implausible units, statistical outliers and value-type mismatches, and
//! validates new records against a reference baseline.

pub mod arrow_handler;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod insight_core;
pub mod record;
pub mod report;
pub mod stats;
pub mod utils;

pub use config::{ColumnNames, EngineConfig};
pub use dataset::{DataPoint, Dataset};
pub use engine::AnomalyEngine;
pub use insight_core::{AnomalyReason, ReferenceBaseline, ValidUnitTable, ValidationStatus};
pub use record::Record;
pub use report::{AnnotatedRecord, DetectionReport, ValidatedRecord, ValidationReport};
pub use stats::Statistics;
pub use utils::AnalysisError;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, AnalysisError>;
