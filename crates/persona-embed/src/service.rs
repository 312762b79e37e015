use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use persona_core::error::{Error, Result};
use persona_core::traits::Embedder;
use persona_core::types::{Channel, ChannelMap, ChannelWeights, CompositePersonaVector, EmbeddingVector, ModelInfo, PersonaChunk};

use crate::math;

/// One ranked candidate from [`EmbeddingService::top_k`].
#[derive(Debug, Clone, Copy)]
pub struct Scored<'a> {
    /// Position of the candidate in the input slice.
    pub index: usize,
    pub embedding: &'a EmbeddingVector,
    pub similarity: f32,
}

/// Text to vector mapping, similarity and composite synthesis over one
/// embedding provider. Cheap to clone.
#[derive(Clone)]
pub struct EmbeddingService {
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingService {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    pub fn dim(&self) -> usize { self.embedder.dim() }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo { model: self.embedder.model_id().to_string(), dimension: self.embedder.dim() }
    }

    /// Embed a batch of texts; the whole batch fails if the provider fails
    /// or returns the wrong number or length of vectors.
    pub fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.embedder.embed_batch(texts)?;
        if vectors.len() != texts.len() {
            return Err(Error::EmbeddingUnavailable {
                attempts: 1,
                reason: format!("provider returned {} vectors for {} inputs", vectors.len(), texts.len()),
            });
        }
        let dim = self.dim();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(Error::DimensionMismatch { expected: dim, actual: bad.len() });
        }
        Ok(vectors)
    }

    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_texts(&[text.to_string()])?;
        vectors.pop().ok_or_else(|| Error::EmbeddingUnavailable { attempts: 1, reason: "empty provider response".into() })
    }

    pub fn embed_chunk(&self, chunk: &PersonaChunk) -> Result<EmbeddingVector> {
        let vector = self.embed_text(&chunk.text)?;
        Ok(to_embedding(chunk, vector))
    }

    /// Embed every chunk in one provider batch, preserving order.
    pub fn embed_chunks(&self, chunks: &[PersonaChunk]) -> Result<Vec<EmbeddingVector>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embed_texts(&texts)?;
        debug!(chunks = chunks.len(), model = self.embedder.model_id(), "embedded persona chunks");
        Ok(chunks.iter().zip(vectors).map(|(c, v)| to_embedding(c, v)).collect())
    }

    pub fn cosine_similarity(&self, v1: &[f32], v2: &[f32]) -> Result<f32> {
        math::cosine_similarity(v1, v2)
    }

    /// Rank `candidates` by similarity to `query`, highest first. Equal
    /// scores keep candidate order. At most `k` results.
    pub fn top_k<'a>(&self, query: &[f32], candidates: &'a [EmbeddingVector], k: usize) -> Result<Vec<Scored<'a>>> {
        let mut scored = candidates
            .iter()
            .enumerate()
            .map(|(index, embedding)| {
                math::cosine_similarity(query, &embedding.vector).map(|similarity| Scored { index, embedding, similarity })
            })
            .collect::<Result<Vec<_>>>()?;
        // sort_by is stable, so ties keep input order.
        scored.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// Average each channel's member vectors (zero vector for an empty
    /// channel), sum the six averages scaled by `weights`, and re-normalize.
    /// A zero weighted sum is [`Error::EmptyComposite`]: there is no
    /// fingerprint to score against.
    pub fn composite_vector(&self, by_channel: &ChannelMap<Vec<&EmbeddingVector>>, weights: &ChannelWeights) -> Result<CompositePersonaVector> {
        let dim = self.dim();
        let mut channel_vectors: ChannelMap<Vec<f32>> = ChannelMap::default();
        for channel in Channel::ALL {
            let members: Vec<&[f32]> = by_channel.get(channel).iter().map(|e| e.vector.as_slice()).collect();
            *channel_vectors.get_mut(channel) = math::mean(&members, dim)?;
        }

        let mut vector = vec![0.0f32; dim];
        for (channel, channel_vector) in channel_vectors.iter() {
            math::add_scaled(&mut vector, channel_vector, *weights.get(channel))?;
        }
        if math::l2_norm(&vector) == 0.0 {
            return Err(Error::EmptyComposite("no populated channel carries a positive weight".into()));
        }
        math::normalize(&mut vector);

        Ok(CompositePersonaVector {
            vector,
            channel_vectors,
            weights: weights.clone(),
            timestamp: Utc::now().timestamp_millis(),
        })
    }

    /// Group embeddings by channel, then build the composite.
    pub fn composite_from_embeddings(&self, embeddings: &[EmbeddingVector], weights: &ChannelWeights) -> Result<CompositePersonaVector> {
        self.composite_vector(&group_by_channel(embeddings), weights)
    }
}

pub fn group_by_channel(embeddings: &[EmbeddingVector]) -> ChannelMap<Vec<&EmbeddingVector>> {
    let mut by_channel: ChannelMap<Vec<&EmbeddingVector>> = ChannelMap::default();
    for e in embeddings {
        by_channel.get_mut(e.channel).push(e);
    }
    by_channel
}

fn to_embedding(chunk: &PersonaChunk, vector: Vec<f32>) -> EmbeddingVector {
    EmbeddingVector {
        vector,
        text: chunk.text.clone(),
        channel: chunk.channel,
        weight: chunk.weight,
        metadata: chunk.metadata.clone(),
    }
}
