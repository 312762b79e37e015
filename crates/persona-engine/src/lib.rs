//! Persona embedding engine: corpus to composite fingerprint, context
//! retrieval, drift checks and index persistence.

pub mod engine;
pub mod index;
pub mod retrieval;

pub use engine::PersonaEmbeddingEngine;
pub use persona_drift::{DriftReport, DriftStats};
pub use retrieval::build_query_text;
