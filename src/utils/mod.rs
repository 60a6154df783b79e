/// Utility modules for error handling and numeric helpers
pub mod error;
pub mod type_convert;

// Re-export commonly used types
pub use error::AnalysisError;
pub use type_convert::{percentile, validate_contamination};
