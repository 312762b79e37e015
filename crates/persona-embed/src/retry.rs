//! Bounded retry and per-call timeout around any [`Embedder`].
//!
//! Provider calls are treated as blocking external operations. A call that
//! times out keeps running on its worker thread; its result is discarded.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::warn;

use persona_core::config::EmbedderSettings;
use persona_core::error::{Error, Result};
use persona_core::traits::Embedder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&EmbedderSettings::default())
    }
}

impl From<&EmbedderSettings> for RetryPolicy {
    fn from(s: &EmbedderSettings) -> Self {
        Self {
            max_retries: s.max_retries,
            initial_backoff: Duration::from_millis(s.initial_backoff_ms),
            max_backoff: Duration::from_millis(s.max_backoff_ms),
            timeout: (s.timeout_ms > 0).then(|| Duration::from_millis(s.timeout_ms)),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff (factor 2) capped at `max_backoff`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

pub struct RetryingEmbedder {
    inner: Arc<dyn Embedder>,
    policy: RetryPolicy,
}

impl RetryingEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    fn attempt(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let Some(timeout) = self.policy.timeout else {
            return self.inner.embed_batch(texts);
        };
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let owned = texts.to_vec();
        thread::Builder::new()
            .name("persona-embed".into())
            .spawn(move || {
                let _ = tx.send(inner.embed_batch(&owned));
            })
            .map_err(|e| Error::EmbeddingUnavailable { attempts: 1, reason: format!("spawn failed: {e}") })?;
        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Error::EmbeddingUnavailable {
                attempts: 1,
                reason: format!("timed out after {} ms", timeout.as_millis()),
            }),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Error::EmbeddingUnavailable {
                attempts: 1,
                reason: "provider worker exited without a result".into(),
            }),
        }
    }
}

impl Embedder for RetryingEmbedder {
    fn model_id(&self) -> &str { self.inner.model_id() }
    fn dim(&self) -> usize { self.inner.dim() }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let max_attempts = self.policy.max_retries + 1;
        let mut last_error = String::new();
        for attempt in 0..max_attempts {
            match self.attempt(texts) {
                Ok(vectors) => return Ok(vectors),
                // Shape errors are not transient.
                Err(e @ Error::DimensionMismatch { .. }) => return Err(e),
                Err(e) => {
                    last_error = e.to_string();
                    if attempt + 1 < max_attempts {
                        let delay = self.policy.delay_for_attempt(attempt);
                        warn!(model = self.inner.model_id(), attempt = attempt + 1, error = %e, delay_ms = delay.as_millis() as u64, "embedding call failed, retrying");
                        thread::sleep(delay);
                    }
                }
            }
        }
        Err(Error::EmbeddingUnavailable { attempts: max_attempts, reason: last_error })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl Embedder for Flaky {
        fn model_id(&self) -> &str { "flaky" }
        fn dim(&self) -> usize { 2 }
        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::EmbeddingUnavailable { attempts: 1, reason: "503".into() });
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            timeout: None,
        }
    }

    #[test]
    fn recovers_within_retry_budget() {
        let flaky = Arc::new(Flaky { failures_left: AtomicU32::new(2), calls: AtomicU32::new(0) });
        let e = RetryingEmbedder::new(flaky.clone(), fast_policy(2));
        assert_eq!(e.embed_batch(&["x".into()]).unwrap().len(), 1);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn exhausting_retries_is_unavailable() {
        let flaky = Arc::new(Flaky { failures_left: AtomicU32::new(10), calls: AtomicU32::new(0) });
        let e = RetryingEmbedder::new(flaky, fast_policy(1));
        let err = e.embed_batch(&["x".into()]).unwrap_err();
        assert!(matches!(err, Error::EmbeddingUnavailable { attempts: 2, .. }));
    }

    struct Slow;

    impl Embedder for Slow {
        fn model_id(&self) -> &str { "slow" }
        fn dim(&self) -> usize { 1 }
        fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            thread::sleep(Duration::from_millis(200));
            Ok(vec![vec![1.0]])
        }
    }

    #[test]
    fn slow_provider_times_out() {
        let policy = RetryPolicy { timeout: Some(Duration::from_millis(10)), ..fast_policy(0) };
        let e = RetryingEmbedder::new(Arc::new(Slow), policy);
        let err = e.embed_batch(&["x".into()]).unwrap_err();
        assert!(err.to_string().contains("timed out"), "{err}");
    }

    #[test]
    fn backoff_is_capped() {
        let p = RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(120),
            timeout: None,
        };
        assert_eq!(p.delay_for_attempt(0), Duration::from_millis(50));
        assert_eq!(p.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(p.delay_for_attempt(4), Duration::from_millis(120));
    }
}
