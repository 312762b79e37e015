use serde_json::Value;

use persona_core::types::{EmbeddingVector, PersonaRetrievalContext};

/// Join the present context fields, in a fixed order, into one query string.
pub fn build_query_text(context: &PersonaRetrievalContext) -> String {
    let parts = [
        ("Student archetype", &context.archetype),
        ("Emotional state", &context.emotional_state),
        ("Coaching move", &context.coaching_move),
        ("Session stage", &context.session_stage),
        ("User message", &context.user_message),
    ];
    parts
        .iter()
        .filter_map(|(label, value)| value.as_deref().map(|v| format!("{label}: {v}")))
        .collect::<Vec<_>>()
        .join(". ")
}

fn metadata_str<'a>(embedding: &'a EmbeddingVector, key: &str) -> Option<&'a str> {
    embedding.metadata.get(key).and_then(Value::as_str)
}

/// Short justification: the matched channel, plus exact archetype and
/// coaching-move metadata hits.
pub fn explain_retrieval(embedding: &EmbeddingVector, context: &PersonaRetrievalContext) -> String {
    let mut reasons = vec![format!("Matched {} channel", embedding.channel)];
    if let Some(archetype) = context.archetype.as_deref() {
        if metadata_str(embedding, "archetype") == Some(archetype) {
            reasons.push(format!("Specific to {archetype} archetype"));
        }
    }
    if let Some(coaching_move) = context.coaching_move.as_deref() {
        if metadata_str(embedding, "moveName") == Some(coaching_move) {
            reasons.push(format!("Relevant to {coaching_move} coaching move"));
        }
    }
    reasons.join("; ")
}
