use serde_json::json;
use tracing::{debug, warn};

use crate::error::Result;
use crate::sources::{strategy_for, ChunkDraft, RawCorpus, SourceKind};
use crate::types::{Channel, ChannelMap, ChunkStats, PersonaChunk};

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Estimated-token ceiling; larger chunks are split at sentence boundaries.
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_tokens: 250 }
    }
}

/// Segments a raw persona corpus into channel-tagged chunks.
///
/// Chunk ids are `<channel>_chunk_<n>_<blake3 prefix>`, with `n` counting
/// up from zero for each processor, so the same corpus always yields the
/// same ids.
#[derive(Debug, Default)]
pub struct ChunkProcessor {
    chunking_config: ChunkingConfig,
    counter: usize,
}

impl ChunkProcessor {
    pub fn new() -> Self { Self::default() }

    pub fn with_max_tokens(max_tokens: usize) -> Self {
        Self { chunking_config: ChunkingConfig { max_tokens: max_tokens.max(1) }, counter: 0 }
    }

    /// Chunk every source. Empty or malformed sources contribute zero chunks.
    pub fn process_all(&mut self, corpus: &RawCorpus) -> Vec<PersonaChunk> {
        let mut all_chunks = Vec::new();
        for kind in SourceKind::ALL {
            match self.process_source(kind, corpus.get(kind)) {
                Ok(chunks) => {
                    debug!(source = %kind, chunks = chunks.len(), "processed persona source");
                    all_chunks.extend(chunks);
                }
                Err(e) => warn!(source = %kind, error = %e, "skipping malformed persona source"),
            }
        }
        debug!(total = all_chunks.len(), "processed persona corpus");
        all_chunks
    }

    /// Like [`Self::process_all`] but the first malformed source is an error.
    pub fn process_all_strict(&mut self, corpus: &RawCorpus) -> Result<Vec<PersonaChunk>> {
        let mut all_chunks = Vec::new();
        for kind in SourceKind::ALL {
            all_chunks.extend(self.process_source(kind, corpus.get(kind))?);
        }
        Ok(all_chunks)
    }

    /// Chunk a single source, applying the safety weight rule and the token ceiling.
    pub fn process_source(&mut self, kind: SourceKind, raw: &str) -> Result<Vec<PersonaChunk>> {
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        let drafts = strategy_for(kind).parse(raw)?;
        let mut chunks = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let chunk = self.assign_id(draft);
            chunks.extend(self.split_large_chunk(&chunk, self.chunking_config.max_tokens));
        }
        Ok(chunks)
    }

    fn assign_id(&mut self, draft: ChunkDraft) -> PersonaChunk {
        let mut chunk = PersonaChunk {
            id: self.next_id(draft.channel, &draft.text),
            text: draft.text,
            channel: draft.channel,
            weight: draft.weight,
            category: draft.category,
            tags: draft.tags,
            metadata: draft.metadata,
        };
        enforce_safety_weight(&mut chunk);
        chunk
    }

    fn next_id(&mut self, channel: Channel, text: &str) -> String {
        let hash = blake3::hash(text.as_bytes()).to_hex();
        let id = format!("{}_chunk_{}_{}", channel, self.counter, &hash.as_str()[..8]);
        self.counter += 1;
        id
    }

    /// Rough token estimate: four characters per token, rounded up.
    /// Monotonic in text length, not exact.
    pub fn estimate_token_count(text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }

    /// Split `chunk` into parts of at most `max_tokens` estimated tokens,
    /// cutting only at sentence boundaries (terminal punctuation or line
    /// breaks). A single sentence longer than the ceiling stays whole.
    pub fn split_large_chunk(&mut self, chunk: &PersonaChunk, max_tokens: usize) -> Vec<PersonaChunk> {
        if Self::estimate_token_count(&chunk.text) <= max_tokens {
            return vec![chunk.clone()];
        }
        let text = chunk.text.as_str();
        let spans = sentence_spans(text);
        let mut pieces: Vec<&str> = Vec::new();
        let mut current: Option<(usize, usize)> = None;
        for (start, end) in spans {
            current = match current {
                None => Some((start, end)),
                Some((cs, ce)) => {
                    if Self::estimate_token_count(text[cs..end].trim()) > max_tokens {
                        pieces.push(text[cs..ce].trim());
                        Some((start, end))
                    } else {
                        Some((cs, end))
                    }
                }
            };
        }
        if let Some((cs, ce)) = current {
            pieces.push(text[cs..ce].trim());
        }
        pieces.retain(|p| !p.is_empty());
        if pieces.len() <= 1 {
            return vec![chunk.clone()];
        }

        pieces
            .into_iter()
            .enumerate()
            .map(|(part, piece)| {
                let mut sub = chunk.clone();
                sub.id = self.next_id(chunk.channel, piece);
                sub.text = piece.to_string();
                sub.metadata.insert("splitFrom".to_string(), json!(chunk.id));
                sub.metadata.insert("part".to_string(), json!(part));
                enforce_safety_weight(&mut sub);
                sub
            })
            .collect()
    }

    pub fn chunk_stats(chunks: &[PersonaChunk]) -> ChunkStats {
        let mut by_channel = ChannelMap::<usize>::default();
        let mut total_weight = 0.0f32;
        let mut total_tokens = 0usize;
        for chunk in chunks {
            *by_channel.get_mut(chunk.channel) += 1;
            total_weight += chunk.weight;
            total_tokens += Self::estimate_token_count(&chunk.text);
        }
        #[allow(clippy::cast_precision_loss)]
        let avg_weight = if chunks.is_empty() { 0.0 } else { total_weight / chunks.len() as f32 };
        ChunkStats { total: chunks.len(), by_channel, avg_weight, total_tokens }
    }
}

/// Safety chunks are never diluted, whatever their source said.
pub fn enforce_safety_weight(chunk: &mut PersonaChunk) {
    if chunk.channel == Channel::Safety {
        chunk.weight = 1.0;
    }
}

/// Byte spans of sentences. A sentence ends after a run of `.`, `!` or `?`
/// (plus closing quotes/brackets) followed by whitespace, or at a newline.
fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let end = if c == '\n' {
            Some(i + c.len_utf8())
        } else if matches!(c, '.' | '!' | '?') {
            let mut end = i + c.len_utf8();
            while let Some(&(j, n)) = chars.peek() {
                if matches!(n, '.' | '!' | '?' | '"' | '\'' | ')' | ']' | '”' | '’') {
                    end = j + n.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            match chars.peek() {
                None => Some(end),
                Some(&(_, n)) if n.is_whitespace() => Some(end),
                _ => None,
            }
        } else {
            None
        };
        if let Some(end) = end {
            if !text[start..end].trim().is_empty() {
                spans.push((start, end));
            }
            start = end;
        }
    }
    if start < text.len() && !text[start..].trim().is_empty() {
        spans.push((start, text.len()));
    }
    spans
}
