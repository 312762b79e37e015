//! Embedding providers, vector math and composite persona synthesis.

use std::sync::Arc;

use tracing::info;

use persona_core::config::EmbedderSettings;
use persona_core::error::{Error, Result};
use persona_core::traits::Embedder;

pub mod hashing;
pub mod math;
pub mod retry;
pub mod service;

pub use hashing::{HashingEmbedder, HASHING_MODEL_ID};
pub use retry::{RetryPolicy, RetryingEmbedder};
pub use service::{group_by_channel, EmbeddingService, Scored};

/// Build the configured provider wrapped in [`RetryingEmbedder`].
pub fn default_embedder(settings: &EmbedderSettings, dim: usize, model_id: &str) -> Result<Arc<dyn Embedder>> {
    settings.validate()?;
    let inner: Arc<dyn Embedder> = match settings.provider.as_str() {
        "hashing" => Arc::new(HashingEmbedder::new(dim).with_model_id(model_id)),
        other => return Err(Error::InvalidConfig(format!("unknown embedding provider '{other}'"))),
    };
    info!(provider = %settings.provider, model = model_id, dim, "using embedding provider");
    Ok(Arc::new(RetryingEmbedder::new(inner, RetryPolicy::from(settings))))
}
