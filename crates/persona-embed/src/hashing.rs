use std::hash::Hasher;
use twox_hash::XxHash64;

use persona_core::error::Result;
use persona_core::traits::Embedder;

use crate::math::normalize;

pub const HASHING_MODEL_ID: &str = "hashing-v1";

const UNIGRAM_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.5;

/// Deterministic feature-hashing embedder.
///
/// Lower-cased word unigrams and bigrams are hashed with xxHash64 into signed
/// buckets, then the vector is L2-normalized. Texts that share vocabulary
/// score higher cosine similarity; identical text always yields a
/// bit-identical vector. Non-empty text without word characters is hashed
/// as a single feature so it still gets a unit vector. Empty text maps to
/// the zero vector.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
    model_id: String,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1), model_id: HASHING_MODEL_ID.to_string() }
    }

    #[must_use]
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        if text.is_empty() {
            return v;
        }
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .map(|t| t.trim_matches('\''))
            .filter(|t| !t.is_empty())
            .collect();

        if tokens.is_empty() {
            self.accumulate(&mut v, text.as_bytes(), UNIGRAM_WEIGHT);
        } else {
            for token in &tokens {
                self.accumulate(&mut v, token.as_bytes(), UNIGRAM_WEIGHT);
            }
            for pair in tokens.windows(2) {
                let bigram = format!("{} {}", pair[0], pair[1]);
                self.accumulate(&mut v, bigram.as_bytes(), BIGRAM_WEIGHT);
            }
        }
        normalize(&mut v);
        v
    }

    fn accumulate(&self, v: &mut [f32], feature: &[u8], weight: f32) {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(feature);
        let h = hasher.finish();
        #[allow(clippy::cast_possible_truncation)]
        let idx = (h % self.dim as u64) as usize;
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        v[idx] += sign * weight;
    }
}

impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str { &self.model_id }
    fn dim(&self) -> usize { self.dim }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{cosine_similarity, l2_norm};

    #[test]
    fn identical_text_is_bit_identical() {
        let e = HashingEmbedder::new(256);
        assert_eq!(e.embed_text("Your reaction makes sense."), e.embed_text("Your reaction makes sense."));
    }

    #[test]
    fn shared_vocabulary_scores_higher() {
        let e = HashingEmbedder::new(1536);
        let base = e.embed_text("Your reaction makes sense and you are not behind.");
        let near = e.embed_text("Your reaction makes sense.");
        let far = e.embed_text("Leverage synergy to optimize quarterly deliverables.");
        let s_near = cosine_similarity(&base, &near).unwrap();
        let s_far = cosine_similarity(&base, &far).unwrap();
        assert!(s_near > s_far, "near={s_near} far={s_far}");
    }

    #[test]
    fn punctuation_only_text_still_has_unit_norm() {
        let e = HashingEmbedder::new(64);
        assert!((l2_norm(&e.embed_text("?!")) - 1.0).abs() < 1e-5);
        assert_eq!(l2_norm(&e.embed_text("")), 0.0);
    }

    #[test]
    fn word_order_changes_the_vector() {
        let e = HashingEmbedder::new(512);
        assert_ne!(e.embed_text("validate then plan"), e.embed_text("plan then validate"));
    }
}
