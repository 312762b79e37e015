//! Raw persona corpus sources and one parsing strategy per source kind.
//!
//! Each source is selected by an explicit [`SourceKind`] tag. Markdown
//! sources are split on `## ` headings; JSON sources are validated against
//! typed schemas before any chunk is built.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use crate::error::{Error, Result};
use crate::types::{Channel, Meta};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    CoreLanguage,
    EqPatterns,
    Heuristics,
    CoachingPatterns,
    GoldenThread,
    ArchetypeMappings,
    NegativeExamples,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Markdown,
    Json,
}

impl SourceKind {
    /// Processing order: language, eq, strategy, pattern, archetype, safety.
    pub const ALL: [SourceKind; 7] = [
        SourceKind::CoreLanguage,
        SourceKind::EqPatterns,
        SourceKind::Heuristics,
        SourceKind::CoachingPatterns,
        SourceKind::GoldenThread,
        SourceKind::ArchetypeMappings,
        SourceKind::NegativeExamples,
    ];

    pub fn format(self) -> SourceFormat {
        match self {
            SourceKind::Heuristics | SourceKind::CoachingPatterns | SourceKind::ArchetypeMappings => {
                SourceFormat::Json
            }
            _ => SourceFormat::Markdown,
        }
    }

    pub fn channel(self) -> Channel {
        match self {
            SourceKind::CoreLanguage => Channel::Language,
            SourceKind::EqPatterns => Channel::Eq,
            SourceKind::Heuristics | SourceKind::CoachingPatterns => Channel::Strategy,
            SourceKind::GoldenThread => Channel::Pattern,
            SourceKind::ArchetypeMappings => Channel::Archetype,
            SourceKind::NegativeExamples => Channel::Safety,
        }
    }

    /// Conventional file name inside a persona corpus directory.
    pub fn file_name(self) -> &'static str {
        match self {
            SourceKind::CoreLanguage => "core_language.md",
            SourceKind::EqPatterns => "eq_patterns.md",
            SourceKind::Heuristics => "heuristics.json",
            SourceKind::CoachingPatterns => "coaching_patterns.json",
            SourceKind::GoldenThread => "golden_thread.md",
            SourceKind::ArchetypeMappings => "archetype_mappings.json",
            SourceKind::NegativeExamples => "negative_examples.md",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// The seven raw sources of a persona corpus. JSON sources are kept as text
/// and validated when chunked. An empty string is an absent source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawCorpus {
    pub core_language: String,
    pub eq_patterns: String,
    pub heuristics: String,
    pub coaching_patterns: String,
    pub golden_thread: String,
    pub archetype_mappings: String,
    pub negative_examples: String,
}

impl RawCorpus {
    pub fn get(&self, kind: SourceKind) -> &str {
        match kind {
            SourceKind::CoreLanguage => &self.core_language,
            SourceKind::EqPatterns => &self.eq_patterns,
            SourceKind::Heuristics => &self.heuristics,
            SourceKind::CoachingPatterns => &self.coaching_patterns,
            SourceKind::GoldenThread => &self.golden_thread,
            SourceKind::ArchetypeMappings => &self.archetype_mappings,
            SourceKind::NegativeExamples => &self.negative_examples,
        }
    }

    pub fn set(&mut self, kind: SourceKind, text: impl Into<String>) {
        let slot = match kind {
            SourceKind::CoreLanguage => &mut self.core_language,
            SourceKind::EqPatterns => &mut self.eq_patterns,
            SourceKind::Heuristics => &mut self.heuristics,
            SourceKind::CoachingPatterns => &mut self.coaching_patterns,
            SourceKind::GoldenThread => &mut self.golden_thread,
            SourceKind::ArchetypeMappings => &mut self.archetype_mappings,
            SourceKind::NegativeExamples => &mut self.negative_examples,
        };
        *slot = text.into();
    }

    #[must_use]
    pub fn with(mut self, kind: SourceKind, text: impl Into<String>) -> Self {
        self.set(kind, text);
        self
    }

    pub fn is_empty(&self) -> bool {
        SourceKind::ALL.iter().all(|k| self.get(*k).trim().is_empty())
    }
}

/// A chunk before it receives an id.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    pub text: String,
    pub channel: Channel,
    pub weight: f32,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub metadata: Meta,
}

impl ChunkDraft {
    fn new(text: String, channel: Channel, weight: f32, category: impl Into<String>, tags: &[&str]) -> Self {
        Self {
            text,
            channel,
            weight,
            category: Some(category.into()),
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            metadata: Meta::new(),
        }
    }

    fn meta(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Turns one kind of raw source into chunk drafts.
pub trait ChunkStrategy: Sync {
    fn kind(&self) -> SourceKind;
    /// Parse the source. Empty input yields no drafts; structurally invalid
    /// input is an [`Error::InvalidSource`].
    fn parse(&self, raw: &str) -> Result<Vec<ChunkDraft>>;
}

pub fn strategy_for(kind: SourceKind) -> &'static dyn ChunkStrategy {
    match kind {
        SourceKind::CoreLanguage => &LanguageSource,
        SourceKind::EqPatterns => &EqSource,
        SourceKind::Heuristics => &HeuristicsSource,
        SourceKind::CoachingPatterns => &CoachingMovesSource,
        SourceKind::GoldenThread => &GoldenThreadSource,
        SourceKind::ArchetypeMappings => &ArchetypeSource,
        SourceKind::NegativeExamples => &NegativeExamplesSource,
    }
}

// ---------------------------------------------------------------------------
// Markdown
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub heading: String,
    pub content: String,
}

/// Split markdown into `## ` sections. `# ` lines are dropped and anything
/// before the first `## ` heading is ignored.
pub fn split_by_headings(markdown: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut heading: Option<String> = None;
    let mut content: Vec<&str> = Vec::new();

    for line in markdown.lines() {
        if let Some(h) = line.strip_prefix("## ") {
            if let Some(prev) = heading.take() {
                sections.push(Section { heading: prev, content: content.join("\n").trim().to_string() });
            }
            heading = Some(h.trim().to_string());
            content.clear();
        } else if line.starts_with("# ") {
            continue;
        } else {
            content.push(line);
        }
    }
    if let Some(prev) = heading {
        sections.push(Section { heading: prev, content: content.join("\n").trim().to_string() });
    }
    sections
}

fn non_blank_lines(content: &str) -> Vec<&str> {
    content.lines().map(str::trim_end).filter(|l| !l.trim().is_empty()).collect()
}

pub struct LanguageSource;

impl ChunkStrategy for LanguageSource {
    fn kind(&self) -> SourceKind { SourceKind::CoreLanguage }

    fn parse(&self, raw: &str) -> Result<Vec<ChunkDraft>> {
        let mut drafts = Vec::new();
        for section in split_by_headings(raw) {
            let lines = non_blank_lines(&section.content);
            let phrases: Vec<&str> = lines.iter().copied().filter(|l| l.starts_with("- ") && !l.starts_with("- **")).collect();
            let meta: Vec<&str> = lines.iter().copied().filter(|l| l.starts_with("- **")).collect();
            if phrases.is_empty() {
                continue;
            }
            let text = format!("{}\n{}\n{}", section.heading, phrases.join("\n"), meta.join("\n"));
            drafts.push(
                ChunkDraft::new(text.trim().to_string(), Channel::Language, 0.9, section.heading, &["idiom", "language_pattern"])
                    .meta("phraseCount", json!(phrases.len())),
            );
        }
        Ok(drafts)
    }
}

pub struct EqSource;

impl ChunkStrategy for EqSource {
    fn kind(&self) -> SourceKind { SourceKind::EqPatterns }

    fn parse(&self, raw: &str) -> Result<Vec<ChunkDraft>> {
        let mut drafts = Vec::new();
        for section in split_by_headings(raw) {
            let bullets: Vec<&str> = non_blank_lines(&section.content).into_iter().filter(|l| l.starts_with("- ")).collect();
            if bullets.is_empty() {
                continue;
            }
            let text = format!("{}\n{}", section.heading, bullets.join("\n"));
            drafts.push(
                ChunkDraft::new(text.trim().to_string(), Channel::Eq, 0.85, section.heading, &["eq_pattern", "emotional_intelligence"])
                    .meta("patternCount", json!(bullets.len())),
            );
        }
        Ok(drafts)
    }
}

/// Sections shorter than this carry too little signal to embed on their own.
const MIN_PATTERN_SECTION_CHARS: usize = 100;

pub struct GoldenThreadSource;

impl ChunkStrategy for GoldenThreadSource {
    fn kind(&self) -> SourceKind { SourceKind::GoldenThread }

    fn parse(&self, raw: &str) -> Result<Vec<ChunkDraft>> {
        Ok(split_by_headings(raw)
            .into_iter()
            .filter(|s| s.content.chars().count() > MIN_PATTERN_SECTION_CHARS)
            .map(|s| {
                let len = s.content.chars().count();
                let text = format!("{}\n{}", s.heading, s.content);
                ChunkDraft::new(text, Channel::Pattern, 0.85, s.heading, &["pattern", "golden_thread"])
                    .meta("sectionLength", json!(len))
            })
            .collect())
    }
}

pub struct NegativeExamplesSource;

impl ChunkStrategy for NegativeExamplesSource {
    fn kind(&self) -> SourceKind { SourceKind::NegativeExamples }

    fn parse(&self, raw: &str) -> Result<Vec<ChunkDraft>> {
        let mut drafts = Vec::new();
        for section in split_by_headings(raw) {
            let lines = non_blank_lines(&section.content);
            let negatives: Vec<&str> = lines.iter().map(|l| l.trim()).filter(|l| l.contains('❌')).collect();
            let positives: Vec<&str> = lines.iter().map(|l| l.trim()).filter(|l| l.contains('✅')).collect();
            if negatives.is_empty() {
                continue;
            }
            let mut text = format!("{}\nNEVER SAY:\n{}", section.heading, negatives.join("\n"));
            if !positives.is_empty() {
                text.push_str("\n\nSAY INSTEAD:\n");
                text.push_str(&positives.join("\n"));
            }
            drafts.push(
                ChunkDraft::new(text.trim().to_string(), Channel::Safety, 1.0, section.heading, &["safety", "anti_pattern", "boundary"])
                    .meta("negativeCount", json!(negatives.len()))
                    .meta("positiveCount", json!(positives.len())),
            );
        }
        Ok(drafts)
    }
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct Heuristic {
    name: String,
    pattern: String,
    weight: f32,
}

#[derive(Debug, Clone, Deserialize)]
struct MoveSignature {
    language_markers: Vec<String>,
    when_used: String,
    typical_followup: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ArchetypeSignature {
    primary_needs: Vec<String>,
    signature_language: Vec<String>,
    avoid: Vec<String>,
    typical_coaching_sequence: Vec<String>,
}

fn invalid(kind: SourceKind, reason: impl Into<String>) -> Error {
    Error::InvalidSource { kind, reason: reason.into() }
}

/// Parse the document and return the named top-level member, if present.
fn top_level_member(kind: SourceKind, raw: &str, key: &str) -> Result<Option<Value>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    let doc: Value = serde_json::from_str(raw).map_err(|e| invalid(kind, e.to_string()))?;
    let Value::Object(mut obj) = doc else {
        return Err(invalid(kind, "top-level value must be an object"));
    };
    Ok(obj.remove(key))
}

/// Named entries of an object member, in document order.
fn named_entries<T: DeserializeOwned>(kind: SourceKind, key: &str, member: Value) -> Result<Vec<(String, T)>> {
    let Value::Object(entries) = member else {
        return Err(invalid(kind, format!("'{key}' must be an object of named entries")));
    };
    entries
        .into_iter()
        .map(|(name, v)| {
            serde_json::from_value::<T>(v)
                .map(|parsed| (name.clone(), parsed))
                .map_err(|e| invalid(kind, format!("{key}.{name}: {e}")))
        })
        .collect()
}

pub struct HeuristicsSource;

impl ChunkStrategy for HeuristicsSource {
    fn kind(&self) -> SourceKind { SourceKind::Heuristics }

    fn parse(&self, raw: &str) -> Result<Vec<ChunkDraft>> {
        let kind = self.kind();
        let Some(member) = top_level_member(kind, raw, "coaching_heuristics")? else {
            return Ok(Vec::new());
        };
        let heuristics: Vec<Heuristic> =
            serde_json::from_value(member).map_err(|e| invalid(kind, format!("coaching_heuristics: {e}")))?;
        heuristics
            .into_iter()
            .map(|h| {
                if !(0.0..=1.0).contains(&h.weight) {
                    return Err(invalid(kind, format!("heuristic '{}' weight {} outside [0, 1]", h.name, h.weight)));
                }
                let text = format!("Heuristic: {}\nPattern: {}\nWeight: {}", h.name, h.pattern, h.weight);
                Ok(ChunkDraft::new(text, Channel::Strategy, h.weight, "coaching_heuristic", &["heuristic", "strategy"])
                    .meta("heuristicName", json!(h.name))
                    .meta("pattern", json!(h.pattern)))
            })
            .collect()
    }
}

pub struct CoachingMovesSource;

impl ChunkStrategy for CoachingMovesSource {
    fn kind(&self) -> SourceKind { SourceKind::CoachingPatterns }

    fn parse(&self, raw: &str) -> Result<Vec<ChunkDraft>> {
        let kind = self.kind();
        let key = "coaching_move_signatures";
        let Some(member) = top_level_member(kind, raw, key)? else {
            return Ok(Vec::new());
        };
        Ok(named_entries::<MoveSignature>(kind, key, member)?
            .into_iter()
            .map(|(name, m)| {
                let text = format!(
                    "Coaching Move: {}\nLanguage Markers: {}\nWhen Used: {}\nTypical Follow-up: {}",
                    name,
                    m.language_markers.join(", "),
                    m.when_used,
                    m.typical_followup
                );
                ChunkDraft::new(text, Channel::Strategy, 0.8, "coaching_move", &["coaching_move", "strategy"])
                    .meta("moveName", json!(name))
                    .meta("whenUsed", json!(m.when_used))
            })
            .collect())
    }
}

pub struct ArchetypeSource;

impl ChunkStrategy for ArchetypeSource {
    fn kind(&self) -> SourceKind { SourceKind::ArchetypeMappings }

    fn parse(&self, raw: &str) -> Result<Vec<ChunkDraft>> {
        let kind = self.kind();
        let key = "archetype_interaction_signatures";
        let Some(member) = top_level_member(kind, raw, key)? else {
            return Ok(Vec::new());
        };
        Ok(named_entries::<ArchetypeSignature>(kind, key, member)?
            .into_iter()
            .map(|(name, a)| {
                let text = format!(
                    "Archetype: {}\nPrimary Needs: {}\nSignature Language: {}\nAvoid: {}\nCoaching Sequence: {}",
                    name,
                    a.primary_needs.join(", "),
                    a.signature_language.join(", "),
                    a.avoid.join(", "),
                    a.typical_coaching_sequence.join(" → ")
                );
                ChunkDraft::new(text, Channel::Archetype, 0.75, name.clone(), &["archetype", "student_type"])
                    .meta("archetype", json!(name))
                    .meta("primaryNeeds", json!(a.primary_needs))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_split_sections_and_skip_preamble() {
        let md = "# Title\nintro text\n## One\nalpha\n### Sub\nbeta\n## Two\ngamma\n";
        let sections = split_by_headings(md);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].heading, "One");
        assert_eq!(sections[0].content, "alpha\n### Sub\nbeta");
        assert_eq!(sections[1].content, "gamma");
    }

    #[test]
    fn language_section_without_phrases_is_skipped() {
        let md = "## Meta only\n- **Tone**: warm\n## Phrases\n- \"Okay.\"\n- **Tone**: calm\n";
        let drafts = LanguageSource.parse(md).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].text, "Phrases\n- \"Okay.\"\n- **Tone**: calm");
        assert_eq!(drafts[0].metadata["phraseCount"], json!(1));
    }

    #[test]
    fn short_golden_thread_sections_are_dropped() {
        let long = "x".repeat(MIN_PATTERN_SECTION_CHARS + 1);
        let md = format!("## Short\ntiny\n## Long\n{long}\n");
        let drafts = GoldenThreadSource.parse(&md).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].category.as_deref(), Some("Long"));
    }

    #[test]
    fn safety_section_needs_a_negative_example() {
        let md = "## Only good\n✅ \"You're okay.\"\n## Mixed\n❌ \"Just relax!\"\n✅ \"This is hard.\"\n";
        let drafts = NegativeExamplesSource.parse(md).unwrap();
        assert_eq!(drafts.len(), 1);
        assert!(drafts[0].text.starts_with("Mixed\nNEVER SAY:\n❌"));
        assert!(drafts[0].text.contains("SAY INSTEAD:\n✅"));
        assert_eq!(drafts[0].weight, 1.0);
    }

    #[test]
    fn heuristics_reject_out_of_range_weight() {
        let raw = r#"{"coaching_heuristics":[{"name":"n","pattern":"p","weight":1.5}]}"#;
        assert!(matches!(HeuristicsSource.parse(raw), Err(Error::InvalidSource { kind: SourceKind::Heuristics, .. })));
    }

    #[test]
    fn heuristics_missing_key_yields_nothing() {
        assert!(HeuristicsSource.parse(r#"{"anti_patterns":[]}"#).unwrap().is_empty());
        assert!(HeuristicsSource.parse("   ").unwrap().is_empty());
    }

    #[test]
    fn coaching_moves_keep_document_order() {
        let raw = r#"{"coaching_move_signatures":{
            "reframe":{"language_markers":["a"],"when_used":"stuck","typical_followup":"evidence"},
            "affirm":{"language_markers":["b","c"],"when_used":"doubt","typical_followup":"guidance"}}}"#;
        let drafts = CoachingMovesSource.parse(raw).unwrap();
        assert_eq!(drafts.len(), 2);
        assert!(drafts[0].text.starts_with("Coaching Move: reframe"));
        assert!(drafts[1].text.contains("Language Markers: b, c"));
    }

    #[test]
    fn archetype_entry_missing_field_is_invalid() {
        let raw = r#"{"archetype_interaction_signatures":{"Drifter":{"primary_needs":[]}}}"#;
        let err = ArchetypeSource.parse(raw).unwrap_err();
        assert!(err.to_string().contains("Drifter"), "{err}");
    }

    #[test]
    fn non_object_document_is_invalid() {
        assert!(CoachingMovesSource.parse("[1,2,3]").is_err());
        assert!(CoachingMovesSource.parse("{not json").is_err());
    }

    #[test]
    fn strategy_table_matches_kind() {
        for kind in SourceKind::ALL {
            assert_eq!(strategy_for(kind).kind(), kind);
        }
    }
}
