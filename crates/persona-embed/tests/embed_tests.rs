use std::sync::Arc;

use proptest::prelude::*;

use persona_core::config::EmbedderSettings;
use persona_core::types::{Channel, ChannelWeights, EmbeddingVector, Meta, DEFAULT_CHANNEL_WEIGHTS};
use persona_core::{Embedder, Error};
use persona_embed::math::{cosine_similarity, l2_norm};
use persona_embed::{default_embedder, EmbeddingService, HashingEmbedder};

const DIM: usize = 128;

fn service() -> EmbeddingService {
    EmbeddingService::new(Arc::new(HashingEmbedder::new(DIM)))
}

fn embedding(service: &EmbeddingService, text: &str, channel: Channel) -> EmbeddingVector {
    EmbeddingVector {
        vector: service.embed_text(text).expect("embed"),
        text: text.to_string(),
        channel,
        weight: 0.8,
        metadata: Meta::new(),
    }
}

#[test]
fn hashing_embedder_shapes_and_determinism() {
    let svc = service();
    let v = svc.embed_texts(&["hello world".to_string(), "hello world".to_string()]).expect("embed_texts");
    assert_eq!(v[0].len(), DIM, "embedding dim is {DIM}");
    assert!((l2_norm(&v[0]) - 1.0).abs() <= 1e-3, "vector is L2-normalized");
    assert_eq!(v[0], v[1]);
}

#[test]
fn default_embedder_rejects_unknown_provider() {
    let settings = EmbedderSettings { provider: "openai".into(), ..EmbedderSettings::default() };
    assert!(default_embedder(&settings, DIM, "x").is_err());
    let ok = default_embedder(&EmbedderSettings::default(), DIM, "hashing-v1").expect("hashing provider");
    assert_eq!(ok.dim(), DIM);
    assert_eq!(ok.model_id(), "hashing-v1");
}

#[test]
fn top_k_is_stable_and_truncated() {
    let svc = service();
    let same = embedding(&svc, "stay with the feeling", Channel::Eq);
    let candidates = vec![
        embedding(&svc, "quarterly revenue targets", Channel::Strategy),
        same.clone(),
        same.clone(),
        embedding(&svc, "stay with it", Channel::Eq),
    ];
    let query = svc.embed_text("stay with the feeling").unwrap();
    let ranked = svc.top_k(&query, &candidates, 2).unwrap();
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].index, 1);
    assert_eq!(ranked[1].index, 2);
    assert!(ranked[0].similarity >= ranked[1].similarity);
    assert!(svc.top_k(&query, &candidates, 10).unwrap().len() == 4);
}

#[test]
fn safety_chunk_only_feeds_the_safety_channel() {
    let svc = service();
    let embeddings = vec![
        embedding(&svc, "Never say calm down", Channel::Safety),
        embedding(&svc, "That sounds heavy", Channel::Eq),
    ];
    let composite = svc.composite_from_embeddings(&embeddings, &DEFAULT_CHANNEL_WEIGHTS).unwrap();
    assert_eq!(composite.channel_vectors.safety, embeddings[0].vector);
    assert_eq!(composite.channel_vectors.eq, embeddings[1].vector);
    for c in [Channel::Language, Channel::Strategy, Channel::Pattern, Channel::Archetype] {
        assert!(composite.channel_vectors.get(c).iter().all(|x| *x == 0.0), "{c} should be empty");
    }
    assert!((l2_norm(&composite.vector) - 1.0).abs() < 1e-4);
}

#[test]
fn composite_without_weighted_content_is_an_error() {
    let svc = service();
    assert!(matches!(svc.composite_from_embeddings(&[], &DEFAULT_CHANNEL_WEIGHTS), Err(Error::EmptyComposite(_))));

    let safety_only = vec![embedding(&svc, "Never say calm down", Channel::Safety)];
    let mut language_only = ChannelWeights::default();
    language_only.language = 1.0;
    assert!(matches!(svc.composite_from_embeddings(&safety_only, &language_only), Err(Error::EmptyComposite(_))));
}

#[test]
fn wrong_length_provider_output_is_rejected() {
    struct Short;
    impl Embedder for Short {
        fn model_id(&self) -> &str { "short" }
        fn dim(&self) -> usize { 4 }
        fn embed_batch(&self, texts: &[String]) -> persona_core::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }
    let svc = EmbeddingService::new(Arc::new(Short));
    let err = svc.embed_text("x").unwrap_err();
    assert!(matches!(err, persona_core::Error::DimensionMismatch { expected: 4, actual: 2 }));
}

proptest! {
    #[test]
    fn embedding_is_deterministic(text in "\\PC{0,80}") {
        let e = HashingEmbedder::new(DIM);
        prop_assert_eq!(e.embed_text(&text), e.embed_text(&text));
    }

    #[test]
    fn non_empty_text_has_unit_norm(text in "\\PC{1,80}") {
        let v = HashingEmbedder::new(DIM).embed_text(&text);
        prop_assert!((l2_norm(&v) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn cosine_stays_in_bounds(a in prop::collection::vec(-10.0f32..10.0, 16), b in prop::collection::vec(-10.0f32..10.0, 16)) {
        let s = cosine_similarity(&a, &b).unwrap();
        prop_assert!((-1.0..=1.0).contains(&s));
        if l2_norm(&a) > 1e-3 {
            prop_assert!((cosine_similarity(&a, &a).unwrap() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn composite_ignores_order_within_a_channel(texts in prop::collection::vec("[a-z]{3,8}( [a-z]{3,8}){0,4}", 2..6)) {
        let svc = service();
        let forward: Vec<EmbeddingVector> = texts.iter().map(|t| embedding(&svc, t, Channel::Language)).collect();
        let mut reversed = forward.clone();
        reversed.reverse();
        let a = svc.composite_from_embeddings(&forward, &DEFAULT_CHANNEL_WEIGHTS).unwrap();
        let b = svc.composite_from_embeddings(&reversed, &DEFAULT_CHANNEL_WEIGHTS).unwrap();
        for (x, y) in a.vector.iter().zip(&b.vector) {
            prop_assert!((x - y).abs() < 1e-5);
        }
    }
}
