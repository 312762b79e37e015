#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod chunk_processor;
pub mod config;
pub mod error;
pub mod sources;
pub mod traits;
pub mod types;

pub use chunk_processor::{enforce_safety_weight, ChunkProcessor};
pub use error::{Error, Result};
pub use sources::{RawCorpus, SourceFormat, SourceKind};
pub use traits::Embedder;
pub use types::*;
