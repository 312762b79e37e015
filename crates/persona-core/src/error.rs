use thiserror::Error;

use crate::sources::SourceKind;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid {kind} source: {reason}")]
    InvalidSource { kind: SourceKind, reason: String },

    #[error("Embedding unavailable after {attempts} attempt(s): {reason}")]
    EmbeddingUnavailable { attempts: u32, reason: String },

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Drift threshold must lie in [0, 1], got {0}")]
    InvalidThreshold(f32),

    #[error("Not initialized: {0}")]
    NotInitialized(&'static str),

    #[error("Persona composite is empty: {0}")]
    EmptyComposite(String),

    #[error("Duplicate chunk id '{0}'")]
    DuplicateChunkId(String),

    #[error("Invalid embedding index: {0}")]
    InvalidIndex(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
