use crate::error::Result;

/// Text to fixed-dimension vector. Implementations may call a remote
/// provider and are therefore allowed to fail with
/// [`crate::Error::EmbeddingUnavailable`].
///
/// Only the hashing embedder is bit-deterministic; callers that need to
/// reuse vectors must key them by chunk id rather than re-embed and compare.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `hashing-v1`).
    fn model_id(&self) -> &str;
    /// Embedding dimensionality (D).
    fn dim(&self) -> usize;
    /// Compute embeddings for a batch of input texts, one vector per text, in order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
