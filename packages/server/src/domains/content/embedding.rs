//! Embedding service: admission-gated, cached embedding generation.
//!
//! Local embedding inference is expensive and effectively single-threaded at
//! the backend, so two mechanisms protect it:
//!
//! - a counting admission gate (default: one in-flight provider call,
//!   regardless of consumer parallelism), released via RAII permit;
//! - a content-addressed cache keyed by the exact input text. The
//!   get-or-create path single-flights concurrent callers racing on the
//!   same key, so N racers produce one provider call and share the result.
//!
//! Downstream failures are logged and replaced with a zero-length vector.
//! Callers can spot the degraded result with [`is_degraded`] — the embed
//! consumer skips persisting it, leaving the item to be retried on the next
//! scan cycle.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use lru::LruCache;
use pgvector::Vector;
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell, Semaphore};

use crate::kernel::BaseEmbeddingModel;

/// Errors visible to callers. Downstream provider failures are not — they
/// degrade to an empty vector by design.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding input must not be empty")]
    EmptyInput,
}

/// True when `vector` is the degraded placeholder produced after a
/// generation failure.
pub fn is_degraded(vector: &Vector) -> bool {
    vector.as_slice().is_empty()
}

/// Sizing knobs, from configuration.
#[derive(Debug, Clone)]
pub struct EmbeddingServiceConfig {
    /// Permits on the admission gate.
    pub max_concurrent: usize,
    /// Maximum number of cached vectors.
    pub cache_capacity: usize,
    /// How long a cached vector stays valid.
    pub cache_ttl: Duration,
}

impl Default for EmbeddingServiceConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            cache_capacity: 1_024,
            cache_ttl: Duration::from_secs(86_400),
        }
    }
}

/// One cache slot. The `OnceCell` is what single-flights concurrent callers:
/// whichever task gets to initialize it runs the provider call, everyone
/// else awaits the same cell.
#[derive(Clone)]
struct CacheSlot {
    cell: Arc<OnceCell<Vector>>,
    inserted_at: Instant,
}

/// Admission-gated, cached embedding generation.
pub struct QueuedEmbeddingService {
    model: Arc<dyn BaseEmbeddingModel>,
    gate: Semaphore,
    slots: Mutex<LruCache<String, CacheSlot>>,
    ttl: Duration,
}

impl QueuedEmbeddingService {
    pub fn new(model: Arc<dyn BaseEmbeddingModel>, config: EmbeddingServiceConfig) -> Self {
        let capacity =
            NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            model,
            gate: Semaphore::new(config.max_concurrent.max(1)),
            slots: Mutex::new(LruCache::new(capacity)),
            ttl: config.cache_ttl,
        }
    }

    /// Generate (or fetch from cache) the embedding for `text`.
    ///
    /// Fails only on empty input. Any downstream failure is logged and
    /// yields the degraded empty vector; the failure is not cached, so the
    /// next call retries.
    pub async fn generate(&self, text: &str) -> Result<Vector, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let cache_key = format!("Embedding:{text}");
        let slot = self.slot(&cache_key).await;

        if let Some(vector) = slot.cell.get() {
            tracing::debug!(cache_key, "Returning cached embedding");
            return Ok(vector.clone());
        }

        let result = slot
            .cell
            .get_or_try_init(|| async {
                let _permit = self
                    .gate
                    .acquire()
                    .await
                    .map_err(|_| anyhow!("embedding admission gate closed"))?;

                tracing::debug!(cache_key, "Generating embedding");
                let owned = text.to_string();
                let mut vectors = self.model.embed(std::slice::from_ref(&owned)).await?;

                if vectors.len() != 1 {
                    return Err(anyhow!(
                        "embedding provider returned {} vectors for one input",
                        vectors.len()
                    ));
                }
                let vector = vectors
                    .pop()
                    .ok_or_else(|| anyhow!("embedding provider returned no vectors"))?;

                Ok::<Vector, anyhow::Error>(Vector::from(vector))
            })
            .await;

        match result {
            Ok(vector) => Ok(vector.clone()),
            Err(err) => {
                tracing::error!(error = %err, "Error generating embedding, returning empty vector");
                Ok(Vector::from(Vec::new()))
            }
        }
    }

    /// Fetch or create the cache slot for a key, evicting an expired entry.
    /// In-flight slots (cell not yet initialized) are always reused so that
    /// racing callers de-duplicate onto one provider call.
    async fn slot(&self, cache_key: &str) -> CacheSlot {
        let mut slots = self.slots.lock().await;

        if let Some(slot) = slots.get(cache_key) {
            let expired = slot.cell.get().is_some() && slot.inserted_at.elapsed() >= self.ttl;
            if !expired {
                return slot.clone();
            }
        }

        let slot = CacheSlot {
            cell: Arc::new(OnceCell::new()),
            inserted_at: Instant::now(),
        };
        slots.put(cache_key.to_string(), slot.clone());
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_dependencies::CountingEmbeddingModel;

    fn config(max_concurrent: usize) -> EmbeddingServiceConfig {
        EmbeddingServiceConfig {
            max_concurrent,
            cache_capacity: 64,
            cache_ttl: Duration::from_secs(600),
        }
    }

    #[tokio::test]
    async fn cache_hit_skips_provider() {
        let model = Arc::new(CountingEmbeddingModel::new(3));
        let service = QueuedEmbeddingService::new(model.clone(), config(1));

        let first = service.generate("repeated tag").await.unwrap();
        let second = service.generate("repeated tag").await.unwrap();

        assert_eq!(first.as_slice(), second.as_slice());
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_on_same_key_deduplicate() {
        let model = Arc::new(
            CountingEmbeddingModel::new(3).with_delay(Duration::from_millis(20)),
        );
        let service = Arc::new(QueuedEmbeddingService::new(model.clone(), config(4)));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service.generate("same text").await.unwrap()
            }));
        }

        let mut vectors = Vec::new();
        for handle in handles {
            vectors.push(handle.await.unwrap());
        }

        assert_eq!(model.call_count(), 1);
        assert!(vectors
            .windows(2)
            .all(|pair| pair[0].as_slice() == pair[1].as_slice()));
    }

    #[tokio::test]
    async fn admission_gate_bounds_concurrent_provider_calls() {
        let model = Arc::new(
            CountingEmbeddingModel::new(3).with_delay(Duration::from_millis(20)),
        );
        let service = Arc::new(QueuedEmbeddingService::new(model.clone(), config(2)));

        let mut handles = Vec::new();
        for i in 0..10 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service.generate(&format!("text {i}")).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(model.call_count(), 10);
        assert!(model.max_concurrency() <= 2);
    }

    #[tokio::test]
    async fn failure_degrades_to_empty_vector_and_is_not_cached() {
        let model = Arc::new(CountingEmbeddingModel::new(3).failing_times(1));
        let service = QueuedEmbeddingService::new(model.clone(), config(1));

        let degraded = service.generate("flaky input").await.unwrap();
        assert!(is_degraded(&degraded));

        // The failure was not cached; the second call reaches the provider
        // and succeeds.
        let healthy = service.generate("flaky input").await.unwrap();
        assert!(!is_degraded(&healthy));
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn empty_input_is_an_error() {
        let model = Arc::new(CountingEmbeddingModel::new(3));
        let service = QueuedEmbeddingService::new(model, config(1));

        assert!(matches!(
            service.generate("  ").await,
            Err(EmbeddingError::EmptyInput)
        ));
    }
}
