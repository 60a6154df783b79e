/// Detection and validation building blocks
pub mod baseline;
pub mod classify;
pub mod controlled;
pub mod feature;
pub mod majority;
pub mod model;
pub mod reason;
pub mod units;

// Re-export commonly used items
pub use baseline::{BaselineOutcome, GroupBaseline, ReferenceBaseline, ReferenceStats, ValidationStatus};
pub use classify::ValueClass;
pub use controlled::GroupAggregate;
pub use majority::MajorityType;
pub use model::{run_isolation_forest, ForestOptions, IsolationForest};
pub use reason::{AnomalyReason, Annotation};
pub use units::{TableDiagnostic, ValidUnitTable};
