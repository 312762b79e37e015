use std::sync::Arc;

use proptest::prelude::*;

use persona_core::types::{Channel, EmbeddingVector, Meta, DEFAULT_CHANNEL_WEIGHTS};
use persona_drift::{DriftDetector, DEFAULT_DRIFT_THRESHOLD};
use persona_embed::{EmbeddingService, HashingEmbedder};

const WARM_LANGUAGE: &[&str] = &[
    "Your reaction makes sense. You are not behind, you are exactly where you need to be.",
    "Let's take a breath together. Nothing about this moment needs fixing yet.",
    "It makes total sense that you'd feel stretched thin right now.",
    "You are allowed to go slowly. Slow is still moving.",
];

fn warm_language_detector() -> DriftDetector {
    let service = EmbeddingService::new(Arc::new(HashingEmbedder::new(1536)));
    let embeddings: Vec<EmbeddingVector> = WARM_LANGUAGE
        .iter()
        .map(|t| EmbeddingVector {
            vector: service.embed_text(t).expect("embed"),
            text: (*t).to_string(),
            channel: Channel::Language,
            weight: 0.9,
            metadata: Meta::new(),
        })
        .collect();
    let composite = service.composite_from_embeddings(&embeddings, &DEFAULT_CHANNEL_WEIGHTS).expect("composite");
    DriftDetector::new(service, Arc::new(composite), DEFAULT_DRIFT_THRESHOLD).expect("detector")
}

#[test]
fn corporate_phrasing_drifts_from_warm_language() {
    let detector = warm_language_detector();
    let result = detector.detect_drift("You must leverage synergy to optimize your workflow.").expect("drift");
    assert!(result.has_drift, "similarity {}", result.similarity);
    assert!(
        result.suggestions.iter().any(|s| s.to_lowercase().contains("vocabulary substitution")),
        "suggestions: {:?}",
        result.suggestions
    );
    assert!(result.channel_drift[&Channel::Language] < 0.7);
}

#[test]
fn batch_aggregates_in_order() {
    let detector = warm_language_detector();
    let outputs = vec![
        WARM_LANGUAGE[0].to_string(),
        "You must leverage synergy to optimize your workflow.".to_string(),
        "Circle back on the deliverables by EOD.".to_string(),
    ];
    let report = detector.detect_drift_batch(&outputs).expect("batch");
    assert_eq!(report.results.len(), 3);
    assert!(report.results[0].similarity > report.results[1].similarity);
    assert_eq!(report.stats.total_outputs, 3);
    assert_eq!(report.stats.drift_count, report.results.iter().filter(|r| r.has_drift).count());
    assert!(report.stats.channel_issues.language >= 2);
    assert_eq!(report.stats.channel_issues.eq, 0, "eq has no reference content");
}

#[test]
fn empty_batch_reports_zeroes() {
    let report = warm_language_detector().detect_drift_batch(&[]).expect("batch");
    assert!(report.results.is_empty());
    assert_eq!(report.stats.drift_rate, 0.0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn has_drift_matches_threshold_at_call_time(text in "[a-z ]{0,60}", threshold in 0.0f32..=1.0) {
        let detector = warm_language_detector();
        detector.set_threshold(threshold).unwrap();
        let r = detector.detect_drift(&text).unwrap();
        prop_assert_eq!(r.has_drift, r.similarity < threshold);
        prop_assert!((r.threshold - threshold).abs() < f32::EPSILON);
        prop_assert!((-1.0..=1.0).contains(&r.similarity));
    }
}
