//! Domain types shared by the chunker, the embedding service, the drift
//! detector and the engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

pub type ChunkId = String;
pub type Meta = serde_json::Map<String, serde_json::Value>;

/// Version tag written into every exported [`EmbeddingIndex`].
pub const INDEX_VERSION: &str = "1.0";

/// One of the six fixed persona dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Language,
    Eq,
    Strategy,
    Pattern,
    Archetype,
    Safety,
}

impl Channel {
    /// All channels in composite-synthesis order.
    pub const ALL: [Channel; 6] = [
        Channel::Language,
        Channel::Eq,
        Channel::Strategy,
        Channel::Pattern,
        Channel::Archetype,
        Channel::Safety,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Language => "language",
            Channel::Eq => "eq",
            Channel::Strategy => "strategy",
            Channel::Pattern => "pattern",
            Channel::Archetype => "archetype",
            Channel::Safety => "safety",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Channel::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidConfig(format!("unknown channel '{s}'")))
    }
}

/// A value for each of the six channels. Serialized as an object keyed by
/// channel name, so every channel is always present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelMap<T> {
    pub language: T,
    pub eq: T,
    pub strategy: T,
    pub pattern: T,
    pub archetype: T,
    pub safety: T,
}

impl<T> ChannelMap<T> {
    pub fn from_fn(mut f: impl FnMut(Channel) -> T) -> Self {
        Self {
            language: f(Channel::Language),
            eq: f(Channel::Eq),
            strategy: f(Channel::Strategy),
            pattern: f(Channel::Pattern),
            archetype: f(Channel::Archetype),
            safety: f(Channel::Safety),
        }
    }

    pub fn get(&self, channel: Channel) -> &T {
        match channel {
            Channel::Language => &self.language,
            Channel::Eq => &self.eq,
            Channel::Strategy => &self.strategy,
            Channel::Pattern => &self.pattern,
            Channel::Archetype => &self.archetype,
            Channel::Safety => &self.safety,
        }
    }

    pub fn get_mut(&mut self, channel: Channel) -> &mut T {
        match channel {
            Channel::Language => &mut self.language,
            Channel::Eq => &mut self.eq,
            Channel::Strategy => &mut self.strategy,
            Channel::Pattern => &mut self.pattern,
            Channel::Archetype => &mut self.archetype,
            Channel::Safety => &mut self.safety,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, &T)> + '_ {
        Channel::ALL.into_iter().map(move |c| (c, self.get(c)))
    }

    pub fn map<U>(&self, mut f: impl FnMut(Channel, &T) -> U) -> ChannelMap<U> {
        ChannelMap::from_fn(|c| f(c, self.get(c)))
    }
}

/// Relative importance of each channel in the composite vector. Need not sum to 1.
pub type ChannelWeights = ChannelMap<f32>;

pub const DEFAULT_CHANNEL_WEIGHTS: ChannelWeights = ChannelMap {
    language: 0.35,
    eq: 0.30,
    strategy: 0.20,
    pattern: 0.10,
    archetype: 0.05,
    safety: 0.05,
};

/// Atomic unit of persona corpus text.
///
/// `weight` is the chunk's own importance and is independent of the
/// channel-level weight in [`ChannelWeights`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaChunk {
    pub id: ChunkId,
    pub text: String,
    pub channel: Channel,
    pub weight: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Meta::is_empty")]
    pub metadata: Meta,
}

impl PersonaChunk {
    pub fn new(id: impl Into<ChunkId>, text: impl Into<String>, channel: Channel, weight: f32) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            channel,
            weight,
            category: None,
            tags: Vec::new(),
            metadata: Meta::new(),
        }
    }
}

/// An embedded chunk. `vector` is unit-normalized for non-empty text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector {
    pub vector: Vec<f32>,
    pub text: String,
    pub channel: Channel,
    pub weight: f32,
    #[serde(default, skip_serializing_if = "Meta::is_empty")]
    pub metadata: Meta,
}

/// The persona's reference fingerprint: the weighted, re-normalized sum of
/// the six per-channel average vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositePersonaVector {
    pub vector: Vec<f32>,
    pub channel_vectors: ChannelMap<Vec<f32>>,
    pub weights: ChannelWeights,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftDetectionResult {
    pub similarity: f32,
    pub has_drift: bool,
    pub threshold: f32,
    pub suggestions: Vec<String>,
    /// Similarity against each channel that has reference content.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub channel_drift: BTreeMap<Channel, f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPersonaChunk {
    pub chunk: PersonaChunk,
    pub embedding: EmbeddingVector,
    pub similarity: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Structured retrieval query supplied by the dialogue layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaRetrievalContext {
    pub archetype: Option<String>,
    pub emotional_state: Option<String>,
    pub coaching_move: Option<String>,
    pub session_stage: Option<String>,
    pub user_message: Option<String>,
    pub top_k: Option<usize>,
}

/// Layers produced by other collaborators and passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditioningLayers {
    pub rhythm_layer: Option<serde_json::Value>,
    pub eq_layer: Option<serde_json::Value>,
    pub archetype_layer: Option<serde_json::Value>,
}

/// Payload handed to the prompt-assembly stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaConditioningContext {
    pub persona_chunks: Vec<RetrievedPersonaChunk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rhythm_layer: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq_layer: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archetype_layer: Option<serde_json::Value>,
    pub composite_vector: CompositePersonaVector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkStats {
    pub total: usize,
    pub by_channel: ChannelMap<usize>,
    pub avg_weight: f32,
    pub total_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model: String,
    pub dimension: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingIndexEntry {
    pub chunk_id: ChunkId,
    pub channel: Channel,
    pub text: String,
    pub vector: Vec<f32>,
    pub weight: f32,
    #[serde(default)]
    pub metadata: Meta,
}

/// Persisted chunk + embedding + composite state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingIndex {
    pub version: String,
    pub persona_name: String,
    pub embedding_model: String,
    pub vector_dimension: usize,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    pub entries: Vec<EmbeddingIndexEntry>,
    pub composite_vector: CompositePersonaVector,
}

impl EmbeddingIndex {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_parses_case_insensitively() {
        assert_eq!("EQ".parse::<Channel>().ok(), Some(Channel::Eq));
        assert_eq!(" safety ".parse::<Channel>().ok(), Some(Channel::Safety));
        assert!("tone".parse::<Channel>().is_err());
    }

    #[test]
    fn channel_map_serializes_every_channel_by_name() {
        let json = serde_json::to_value(DEFAULT_CHANNEL_WEIGHTS).unwrap();
        for c in Channel::ALL {
            assert!(json.get(c.as_str()).is_some(), "missing {c}");
        }
    }

    #[test]
    fn channel_map_iterates_in_fixed_order() {
        let m = ChannelMap::from_fn(|c| c.as_str().len());
        let order: Vec<Channel> = m.iter().map(|(c, _)| c).collect();
        assert_eq!(order, Channel::ALL.to_vec());
        assert_eq!(*m.get(Channel::Archetype), "archetype".len());
    }

    #[test]
    fn drift_result_uses_camel_case_keys() {
        let mut channel_drift = BTreeMap::new();
        channel_drift.insert(Channel::Language, 0.5);
        let r = DriftDetectionResult {
            similarity: 0.5,
            has_drift: true,
            threshold: 0.78,
            suggestions: vec![],
            channel_drift,
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["hasDrift"], serde_json::json!(true));
        assert!(json["channelDrift"].get("language").is_some());
    }
}
