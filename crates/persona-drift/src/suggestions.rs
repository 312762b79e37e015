use std::collections::BTreeMap;

use persona_core::types::Channel;

/// Channels scoring below this similarity are flagged as issues.
pub const CHANNEL_SUB_THRESHOLD: f32 = 0.7;

/// Suggestions are drawn from at most this many of the worst channels.
pub const MAX_SUGGESTIONS: usize = 3;

/// Fixed remediation hint for a weak channel.
pub fn suggestion_for(channel: Channel) -> &'static str {
    match channel {
        Channel::Language => "Apply vocabulary substitution: replace generic assistant phrasing with persona idioms",
        Channel::Eq => "Increase emotional validation: add nervous system language and grounding phrases",
        Channel::Strategy => "Apply coaching heuristics: validate before strategy and keep to one clean move",
        Channel::Pattern => "Add pattern recognition: surface the underlying pattern instead of solving the surface symptom",
        Channel::Archetype => "Adjust for the student archetype: tailor language and approach to its needs",
        Channel::Safety => "Review safety boundaries: check for toxic positivity, false urgency or emotional dismissal",
    }
}

/// Rank channel scores ascending and emit one hint for each of the worst
/// [`MAX_SUGGESTIONS`] channels that fall below [`CHANNEL_SUB_THRESHOLD`].
pub fn suggestions_for(channel_drift: &BTreeMap<Channel, f32>) -> Vec<String> {
    let mut ranked: Vec<(Channel, f32)> = channel_drift.iter().map(|(c, s)| (*c, *s)).collect();
    // Stable sort: equal scores keep channel order.
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
    ranked
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .filter(|(_, s)| *s < CHANNEL_SUB_THRESHOLD)
        .map(|(c, _)| suggestion_for(c).to_string())
        .collect()
}
