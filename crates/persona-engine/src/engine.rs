use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use persona_core::config::{validate_channel_weights, PersonaConfig};
use persona_core::error::{Error, Result};
use persona_core::traits::Embedder;
use persona_core::types::{
    Channel, ChannelWeights, ChunkStats, CompositePersonaVector, ConditioningLayers, DriftDetectionResult,
    EmbeddingIndex, EmbeddingVector, ModelInfo, PersonaChunk, PersonaConditioningContext, PersonaRetrievalContext,
    RetrievedPersonaChunk, INDEX_VERSION,
};
use persona_core::{enforce_safety_weight, ChunkProcessor, RawCorpus};
use persona_drift::{DriftDetector, DriftReport};
use persona_embed::{default_embedder, EmbeddingService};

use crate::index;
use crate::retrieval::{build_query_text, explain_retrieval};

const NOT_INITIALIZED: &str = "persona engine has no corpus; call initialize or import_index first";

/// Everything derived from one corpus snapshot. Built completely before it
/// is published and never mutated afterwards; `chunks[i]` and
/// `embeddings[i]` always describe the same chunk.
struct PersonaState {
    chunks: Arc<[PersonaChunk]>,
    embeddings: Arc<[EmbeddingVector]>,
    composite: Arc<CompositePersonaVector>,
    detector: Arc<DriftDetector>,
}

/// Owns the persona lifecycle: chunk, embed, compose, retrieve, check drift.
///
/// Reads take a snapshot of the current state; re-initialization and weight
/// changes build a new state off to the side and swap it in one step.
pub struct PersonaEmbeddingEngine {
    config: PersonaConfig,
    service: EmbeddingService,
    threshold: RwLock<f32>,
    state: RwLock<Option<Arc<PersonaState>>>,
}

impl PersonaEmbeddingEngine {
    pub fn new(config: PersonaConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.validate()?;
        if embedder.dim() != config.vector_dimension {
            return Err(Error::DimensionMismatch { expected: config.vector_dimension, actual: embedder.dim() });
        }
        let threshold = RwLock::new(config.drift_threshold);
        Ok(Self { config, service: EmbeddingService::new(embedder), threshold, state: RwLock::new(None) })
    }

    /// Engine over the provider named in `config.embedder`.
    pub fn from_config(config: PersonaConfig) -> Result<Self> {
        let embedder = default_embedder(&config.embedder, config.vector_dimension, &config.embedding_model)?;
        Self::new(config, embedder)
    }

    pub fn config(&self) -> &PersonaConfig { &self.config }

    pub fn model_info(&self) -> ModelInfo { self.service.model_info() }

    pub fn is_initialized(&self) -> bool { self.state.read().is_some() }

    fn snapshot(&self) -> Result<Arc<PersonaState>> {
        self.state.read().clone().ok_or(Error::NotInitialized(NOT_INITIALIZED))
    }

    /// Channel weights of the live composite, or the configured ones before
    /// the first initialization.
    fn current_weights(&self) -> ChannelWeights {
        match self.state.read().as_ref() {
            Some(state) => state.composite.weights.clone(),
            None => self.config.channel_weights.clone(),
        }
    }

    fn build_state(
        &self,
        chunks: Arc<[PersonaChunk]>,
        embeddings: Arc<[EmbeddingVector]>,
        composite: CompositePersonaVector,
    ) -> Result<PersonaState> {
        let composite = Arc::new(composite);
        let detector = DriftDetector::new(self.service.clone(), Arc::clone(&composite), *self.threshold.read())?;
        Ok(PersonaState { chunks, embeddings, composite, detector: Arc::new(detector) })
    }

    fn publish(&self, state: PersonaState) {
        let mut slot = self.state.write();
        // A threshold set while the state was being built must not be lost.
        let threshold = *self.threshold.read();
        if state.detector.set_threshold(threshold).is_err() {
            warn!(threshold, "ignoring out-of-range engine threshold");
        }
        *slot = Some(Arc::new(state));
    }

    /// Chunk, embed and compose `corpus`. Any embedding failure aborts the
    /// whole run and leaves the previous state (if any) in place.
    pub fn initialize(&self, corpus: &RawCorpus) -> Result<()> {
        let mut processor = ChunkProcessor::with_max_tokens(self.config.chunk_size);
        let chunks = processor.process_all(corpus);
        self.initialize_chunks(chunks)
    }

    /// Initialize from already chunked content. Chunk ids must be unique;
    /// a duplicate is rejected before anything is embedded.
    pub fn initialize_chunks(&self, mut chunks: Vec<PersonaChunk>) -> Result<()> {
        {
            let mut seen = HashSet::with_capacity(chunks.len());
            for chunk in &chunks {
                if !seen.insert(chunk.id.as_str()) {
                    return Err(Error::DuplicateChunkId(chunk.id.clone()));
                }
            }
        }
        for chunk in &mut chunks {
            enforce_safety_weight(chunk);
        }
        let embeddings = self.service.embed_chunks(&chunks)?;
        let composite = self.service.composite_from_embeddings(&embeddings, &self.current_weights())?;
        let stats = ChunkProcessor::chunk_stats(&chunks);
        let state = self.build_state(chunks.into(), embeddings.into(), composite)?;
        self.publish(state);
        info!(
            persona = %self.config.name,
            chunks = stats.total,
            tokens = stats.total_tokens,
            model = %self.service.model_info().model,
            "persona initialized"
        );
        Ok(())
    }

    /// Rebuild the composite and detector from the held embeddings with new
    /// channel weights.
    pub fn update_channel_weights(&self, weights: ChannelWeights) -> Result<()> {
        validate_channel_weights(&weights)?;
        let current = self.snapshot()?;
        let composite = self.service.composite_from_embeddings(&current.embeddings, &weights)?;
        let state = self.build_state(Arc::clone(&current.chunks), Arc::clone(&current.embeddings), composite)?;
        self.publish(state);
        info!(?weights, "persona channel weights updated");
        Ok(())
    }

    pub fn drift_threshold(&self) -> f32 { *self.threshold.read() }

    /// Validated; the live detector picks the new value up immediately.
    pub fn set_drift_threshold(&self, threshold: f32) -> Result<()> {
        let slot = self.state.read();
        if let Some(state) = slot.as_ref() {
            state.detector.set_threshold(threshold)?;
        } else if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::InvalidThreshold(threshold));
        }
        *self.threshold.write() = threshold;
        Ok(())
    }

    pub fn retrieve_for_context(&self, context: &PersonaRetrievalContext) -> Result<Vec<RetrievedPersonaChunk>> {
        let state = self.snapshot()?;
        self.retrieve_from(&state, context)
    }

    fn retrieve_from(&self, state: &PersonaState, context: &PersonaRetrievalContext) -> Result<Vec<RetrievedPersonaChunk>> {
        // Zero means "not set", same as None.
        let k = context.top_k.filter(|&k| k > 0).unwrap_or(self.config.default_top_k);
        let query_text = build_query_text(context);
        let query = self.service.embed_text(&query_text)?;
        let ranked = self.service.top_k(&query, &state.embeddings, k)?;
        debug!(query = %query_text, k, hits = ranked.len(), "retrieved persona chunks");
        Ok(ranked
            .into_iter()
            .map(|hit| RetrievedPersonaChunk {
                chunk: state.chunks[hit.index].clone(),
                embedding: hit.embedding.clone(),
                similarity: hit.similarity,
                reason: Some(explain_retrieval(hit.embedding, context)),
            })
            .collect())
    }

    /// Retrieved chunks plus pass-through layers for prompt assembly, all
    /// taken from one state snapshot.
    pub fn build_conditioning_context(
        &self,
        context: &PersonaRetrievalContext,
        layers: ConditioningLayers,
    ) -> Result<PersonaConditioningContext> {
        let state = self.snapshot()?;
        let persona_chunks = self.retrieve_from(&state, context)?;
        Ok(PersonaConditioningContext {
            persona_chunks,
            rhythm_layer: layers.rhythm_layer,
            eq_layer: layers.eq_layer,
            archetype_layer: layers.archetype_layer,
            composite_vector: (*state.composite).clone(),
        })
    }

    pub fn check_drift(&self, output: &str) -> Result<DriftDetectionResult> {
        self.snapshot()?.detector.detect_drift(output)
    }

    pub fn check_drift_batch(&self, outputs: &[String]) -> Result<DriftReport> {
        self.snapshot()?.detector.detect_drift_batch(outputs)
    }

    pub fn composite_vector(&self) -> Result<Arc<CompositePersonaVector>> {
        Ok(Arc::clone(&self.snapshot()?.composite))
    }

    pub fn chunks(&self) -> Result<Arc<[PersonaChunk]>> {
        Ok(Arc::clone(&self.snapshot()?.chunks))
    }

    pub fn embeddings(&self) -> Result<Arc<[EmbeddingVector]>> {
        Ok(Arc::clone(&self.snapshot()?.embeddings))
    }

    pub fn chunks_by_channel(&self, channel: Channel) -> Result<Vec<PersonaChunk>> {
        Ok(self.snapshot()?.chunks.iter().filter(|c| c.channel == channel).cloned().collect())
    }

    pub fn stats(&self) -> Result<ChunkStats> {
        Ok(ChunkProcessor::chunk_stats(&self.snapshot()?.chunks))
    }

    pub fn export_index(&self) -> Result<EmbeddingIndex> {
        let state = self.snapshot()?;
        let model = self.model_info();
        let entries = state.chunks.iter().zip(state.embeddings.iter()).map(|(c, e)| index::to_entry(c, e)).collect();
        info!(persona = %self.config.name, entries = state.chunks.len(), "exporting embedding index");
        Ok(EmbeddingIndex {
            version: INDEX_VERSION.to_string(),
            persona_name: self.config.name.clone(),
            embedding_model: model.model,
            vector_dimension: model.dimension,
            created_at: Utc::now().timestamp_millis(),
            entries,
            composite_vector: (*state.composite).clone(),
        })
    }

    /// Restore a previously exported state without re-embedding. The index
    /// is validated in full before anything is swapped in.
    pub fn import_index(&self, persisted: EmbeddingIndex) -> Result<()> {
        index::validate(&persisted, &self.model_info())?;
        if persisted.persona_name != self.config.name {
            warn!(index = %persisted.persona_name, engine = %self.config.name, "importing an index built for another persona");
        }
        let entries = persisted.entries.len();
        let (chunks, embeddings): (Vec<_>, Vec<_>) = persisted.entries.into_iter().map(index::from_entry).unzip();
        let state = self.build_state(chunks.into(), embeddings.into(), persisted.composite_vector)?;
        self.publish(state);
        info!(persona = %persisted.persona_name, entries, "embedding index imported");
        Ok(())
    }
}
