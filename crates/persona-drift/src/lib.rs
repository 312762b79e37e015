//! Persona drift scoring against a composite reference vector.

pub mod detector;
pub mod stats;
pub mod suggestions;

pub use detector::{DriftDetector, DriftReport, DEFAULT_DRIFT_THRESHOLD};
pub use stats::DriftStats;
pub use suggestions::{suggestion_for, CHANNEL_SUB_THRESHOLD, MAX_SUGGESTIONS};
