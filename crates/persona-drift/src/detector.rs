use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use persona_core::error::{Error, Result};
use persona_core::types::{CompositePersonaVector, DriftDetectionResult};
use persona_embed::math::l2_norm;
use persona_embed::EmbeddingService;

use crate::stats::DriftStats;
use crate::suggestions::suggestions_for;

pub const DEFAULT_DRIFT_THRESHOLD: f32 = 0.78;

/// Per-output results of a batch plus their aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub results: Vec<DriftDetectionResult>,
    pub stats: DriftStats,
}

/// Scores candidate outputs against a reference composite.
///
/// Threshold and reference are both swappable through `&self`. Each is read
/// once per call, under its own lock, so a swap that lands mid-call may pair
/// the new value of one with the old value of the other.
pub struct DriftDetector {
    service: EmbeddingService,
    reference: RwLock<Arc<CompositePersonaVector>>,
    threshold: RwLock<f32>,
}

fn validate_threshold(threshold: f32) -> Result<()> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(Error::InvalidThreshold(threshold))
    }
}

impl DriftDetector {
    pub fn new(service: EmbeddingService, reference: Arc<CompositePersonaVector>, threshold: f32) -> Result<Self> {
        validate_threshold(threshold)?;
        if reference.vector.len() != service.dim() {
            return Err(Error::DimensionMismatch { expected: service.dim(), actual: reference.vector.len() });
        }
        Ok(Self { service, reference: RwLock::new(reference), threshold: RwLock::new(threshold) })
    }

    pub fn threshold(&self) -> f32 { *self.threshold.read() }

    /// Out-of-range values are rejected and the previous threshold is kept.
    pub fn set_threshold(&self, threshold: f32) -> Result<()> {
        validate_threshold(threshold)?;
        *self.threshold.write() = threshold;
        info!(threshold, "drift threshold updated");
        Ok(())
    }

    pub fn reference(&self) -> Arc<CompositePersonaVector> { self.reference.read().clone() }

    pub fn update_reference(&self, reference: Arc<CompositePersonaVector>) -> Result<()> {
        if reference.vector.len() != self.service.dim() {
            return Err(Error::DimensionMismatch { expected: self.service.dim(), actual: reference.vector.len() });
        }
        *self.reference.write() = reference;
        info!("drift reference composite replaced");
        Ok(())
    }

    /// Embed `output` once and score it overall and per channel.
    pub fn detect_drift(&self, output: &str) -> Result<DriftDetectionResult> {
        let embedding = self.service.embed_text(output)?;
        self.score_embedding(&embedding)
    }

    /// Score an already embedded output against the current reference.
    pub fn score_embedding(&self, embedding: &[f32]) -> Result<DriftDetectionResult> {
        let reference = self.reference();
        score(&self.service, &reference, self.threshold(), embedding)
    }

    /// Check `outputs` in order. The batch is embedded in one provider call
    /// and scored against a single snapshot of reference and threshold.
    pub fn detect_drift_batch(&self, outputs: &[String]) -> Result<DriftReport> {
        let embeddings = self.service.embed_texts(outputs)?;
        let reference = self.reference();
        let threshold = self.threshold();
        let results = embeddings
            .iter()
            .map(|e| score(&self.service, &reference, threshold, e))
            .collect::<Result<Vec<_>>>()?;
        let stats = DriftStats::from_results(&results);
        info!(outputs = stats.total_outputs, drift = stats.drift_count, avg_similarity = stats.avg_similarity, "drift batch checked");
        Ok(DriftReport { results, stats })
    }
}

fn score(service: &EmbeddingService, reference: &CompositePersonaVector, threshold: f32, embedding: &[f32]) -> Result<DriftDetectionResult> {
    let similarity = service.cosine_similarity(embedding, &reference.vector)?;
    let has_drift = similarity < threshold;

    // Channels with no reference content have nothing to drift from.
    let mut channel_drift = BTreeMap::new();
    for (channel, channel_vector) in reference.channel_vectors.iter() {
        if l2_norm(channel_vector) > 0.0 {
            channel_drift.insert(channel, service.cosine_similarity(embedding, channel_vector)?);
        }
    }

    let suggestions = if has_drift { suggestions_for(&channel_drift) } else { Vec::new() };
    debug!(similarity, threshold, has_drift, suggestions = suggestions.len(), "drift scored");
    Ok(DriftDetectionResult { similarity, has_drift, threshold, suggestions, channel_drift })
}

#[cfg(test)]
mod tests {
    use super::*;
    use persona_core::types::{Channel, EmbeddingVector, Meta, DEFAULT_CHANNEL_WEIGHTS};
    use persona_embed::HashingEmbedder;

    fn detector(texts: &[(&str, Channel)]) -> DriftDetector {
        let service = EmbeddingService::new(Arc::new(HashingEmbedder::new(256)));
        let embeddings: Vec<EmbeddingVector> = texts
            .iter()
            .map(|(t, c)| EmbeddingVector {
                vector: service.embed_text(t).unwrap(),
                text: (*t).to_string(),
                channel: *c,
                weight: 0.9,
                metadata: Meta::new(),
            })
            .collect();
        let composite = service.composite_from_embeddings(&embeddings, &DEFAULT_CHANNEL_WEIGHTS).unwrap();
        DriftDetector::new(service, Arc::new(composite), DEFAULT_DRIFT_THRESHOLD).unwrap()
    }

    #[test]
    fn rejected_threshold_keeps_previous_value() {
        let d = detector(&[("your reaction makes sense", Channel::Language)]);
        assert!(matches!(d.set_threshold(1.2), Err(Error::InvalidThreshold(_))));
        assert!(d.set_threshold(-0.1).is_err());
        assert!((d.threshold() - DEFAULT_DRIFT_THRESHOLD).abs() < f32::EPSILON);
        d.set_threshold(0.5).unwrap();
        assert!((d.threshold() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_channels_are_not_scored() {
        let d = detector(&[("your reaction makes sense", Channel::Language), ("that sounds heavy", Channel::Eq)]);
        let r = d.detect_drift("quarterly synergy").unwrap();
        let scored: Vec<Channel> = r.channel_drift.keys().copied().collect();
        assert_eq!(scored, vec![Channel::Language, Channel::Eq]);
    }

    #[test]
    fn reference_text_itself_does_not_drift() {
        let d = detector(&[("your reaction makes sense and you are not behind", Channel::Language)]);
        let r = d.detect_drift("your reaction makes sense and you are not behind").unwrap();
        assert!(r.similarity > 0.99);
        assert!(!r.has_drift);
        assert!(r.suggestions.is_empty());
    }

    #[test]
    fn swapped_reference_is_used_by_later_checks() {
        let d = detector(&[("your reaction makes sense", Channel::Language)]);
        let other = detector(&[("leverage synergy to optimize workflow", Channel::Strategy)]).reference();
        d.update_reference(other).unwrap();
        let r = d.detect_drift("leverage synergy to optimize workflow").unwrap();
        assert!(!r.has_drift);
        assert!(r.channel_drift.contains_key(&Channel::Strategy));
    }
}
