//! Conversion between engine state and the persisted [`EmbeddingIndex`].
//!
//! Chunk `category` and `tags` have no column of their own in an index
//! entry, so they travel in the entry metadata under the keys below.

use std::collections::HashSet;

use serde_json::{json, Value};

use persona_core::config::validate_channel_weights;
use persona_core::enforce_safety_weight;
use persona_core::error::{Error, Result};
use persona_core::types::{
    EmbeddingIndex, EmbeddingIndexEntry, EmbeddingVector, ModelInfo, PersonaChunk, INDEX_VERSION,
};
use persona_embed::math::l2_norm;

const CATEGORY_KEY: &str = "category";
const TAGS_KEY: &str = "tags";

pub fn to_entry(chunk: &PersonaChunk, embedding: &EmbeddingVector) -> EmbeddingIndexEntry {
    let mut metadata = embedding.metadata.clone();
    if let Some(category) = &chunk.category {
        metadata.insert(CATEGORY_KEY.to_string(), json!(category));
    }
    if !chunk.tags.is_empty() {
        metadata.insert(TAGS_KEY.to_string(), json!(chunk.tags));
    }
    EmbeddingIndexEntry {
        chunk_id: chunk.id.clone(),
        channel: embedding.channel,
        text: embedding.text.clone(),
        vector: embedding.vector.clone(),
        weight: embedding.weight,
        metadata,
    }
}

/// Safety entries come back at weight 1.0 whatever the file says.
pub fn from_entry(entry: EmbeddingIndexEntry) -> (PersonaChunk, EmbeddingVector) {
    let mut metadata = entry.metadata;
    let category = match metadata.remove(CATEGORY_KEY) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    };
    let tags = match metadata.remove(TAGS_KEY) {
        Some(Value::Array(items)) => items.into_iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
        _ => Vec::new(),
    };
    let mut chunk = PersonaChunk {
        id: entry.chunk_id,
        text: entry.text.clone(),
        channel: entry.channel,
        weight: entry.weight,
        category,
        tags,
        metadata: metadata.clone(),
    };
    enforce_safety_weight(&mut chunk);
    let embedding = EmbeddingVector {
        vector: entry.vector,
        text: entry.text,
        channel: entry.channel,
        weight: chunk.weight,
        metadata,
    };
    (chunk, embedding)
}

/// Reject an index this engine cannot serve: wrong version, a different
/// embedding model or dimension, malformed vectors, a zero composite,
/// duplicate chunk ids.
pub fn validate(index: &EmbeddingIndex, model: &ModelInfo) -> Result<()> {
    if index.version != INDEX_VERSION {
        return Err(Error::InvalidIndex(format!("unsupported version '{}', expected '{INDEX_VERSION}'", index.version)));
    }
    if index.embedding_model != model.model {
        return Err(Error::InvalidIndex(format!(
            "index was built with '{}' but the engine embeds with '{}'",
            index.embedding_model, model.model
        )));
    }
    if index.vector_dimension != model.dimension {
        return Err(Error::InvalidIndex(format!(
            "index dimension {} does not match engine dimension {}",
            index.vector_dimension, model.dimension
        )));
    }

    let mut seen = HashSet::with_capacity(index.entries.len());
    for entry in &index.entries {
        if entry.vector.len() != model.dimension {
            return Err(Error::InvalidIndex(format!(
                "entry '{}' has {} dimensions, expected {}",
                entry.chunk_id,
                entry.vector.len(),
                model.dimension
            )));
        }
        if !seen.insert(entry.chunk_id.as_str()) {
            return Err(Error::InvalidIndex(format!("duplicate chunk id '{}'", entry.chunk_id)));
        }
    }

    let composite = &index.composite_vector;
    if composite.vector.len() != model.dimension {
        return Err(Error::InvalidIndex(format!("composite vector has {} dimensions", composite.vector.len())));
    }
    if l2_norm(&composite.vector) == 0.0 {
        return Err(Error::InvalidIndex("composite vector is all zeros".into()));
    }
    for (channel, v) in composite.channel_vectors.iter() {
        if v.len() != model.dimension {
            return Err(Error::InvalidIndex(format!("{channel} channel vector has {} dimensions", v.len())));
        }
    }
    validate_channel_weights(&composite.weights).map_err(|e| Error::InvalidIndex(e.to_string()))
}
