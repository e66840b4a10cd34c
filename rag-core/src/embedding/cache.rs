//! Embedding cache: LRU + TTL keyed by SHA-256 of trimmed text.
//!
//! Wraps any [`EmbeddingClient`], since the trait itself never caches.

use super::provider::EmbeddingClient;
use crate::error::Result;
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

struct CachedEmbedding {
    vector: Vec<f32>,
    cached_at: Instant,
}

/// Hit/miss counters for the embedding cache.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddingCacheMetrics {
    /// Cache hits served without calling the wrapped client.
    pub hits: u64,
    /// Cache misses that required calling the wrapped client.
    pub misses: u64,
}

impl EmbeddingCacheMetrics {
    /// Fraction of lookups that were hits, in `[0.0, 1.0]`.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// LRU+TTL cache in front of an [`EmbeddingClient`].
pub struct EmbeddingCache<C: EmbeddingClient> {
    inner: C,
    cache: Mutex<LruCache<String, CachedEmbedding>>,
    ttl: Duration,
    metrics: Mutex<EmbeddingCacheMetrics>,
}

impl<C: EmbeddingClient> EmbeddingCache<C> {
    /// Wrap `inner` with an LRU cache of `capacity` entries and the given
    /// `ttl`.
    #[must_use]
    pub fn new(inner: C, capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
            ttl,
            metrics: Mutex::new(EmbeddingCacheMetrics::default()),
        }
    }

    /// Cache key for `text`: SHA-256 of the trimmed text.
    #[must_use]
    pub fn key_for(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.trim());
        format!("{:x}", hasher.finalize())
    }

    /// Snapshot the hit/miss counters.
    #[must_use]
    pub fn metrics(&self) -> EmbeddingCacheMetrics {
        *self.metrics.lock()
    }

    /// Embed a single piece of text, serving from cache when possible.
    ///
    /// # Errors
    /// Propagates any error from the wrapped [`EmbeddingClient`] on a miss.
    pub async fn embed_cached(&self, text: &str) -> Result<Vec<f32>> {
        let key = Self::key_for(text);

        {
            let mut cache = self.cache.lock();
            if let Some(entry) = cache.get(&key) {
                if entry.cached_at.elapsed() < self.ttl {
                    self.metrics.lock().hits += 1;
                    return Ok(entry.vector.clone());
                }
                cache.pop(&key);
            }
        }

        self.metrics.lock().misses += 1;
        let vector = self.inner.embed_one(text).await?;
        self.cache.lock().put(
            key,
            CachedEmbedding {
                vector: vector.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(vector)
    }

    /// Embed a batch of texts, serving cached entries and only calling the
    /// wrapped client for the misses, preserving input order.
    ///
    /// # Errors
    /// Propagates any error from the wrapped [`EmbeddingClient`] for the
    /// uncached subset.
    pub async fn embed_batch_cached(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut miss_indices = Vec::new();
        let mut miss_texts = Vec::new();

        {
            let mut cache = self.cache.lock();
            for (i, text) in texts.iter().enumerate() {
                let key = Self::key_for(text);
                if let Some(entry) = cache.get(&key) {
                    if entry.cached_at.elapsed() < self.ttl {
                        results[i] = Some(entry.vector.clone());
                        continue;
                    }
                    cache.pop(&key);
                }
                miss_indices.push(i);
                miss_texts.push(text.clone());
            }
        }

        {
            let mut metrics = self.metrics.lock();
            metrics.hits += (texts.len() - miss_texts.len()) as u64;
            metrics.misses += miss_texts.len() as u64;
        }

        if !miss_texts.is_empty() {
            let embedded = self.inner.embed(&miss_texts).await?;
            let mut cache = self.cache.lock();
            for (idx, vector) in miss_indices.into_iter().zip(embedded) {
                let key = Self::key_for(&texts[idx]);
                cache.put(
                    key,
                    CachedEmbedding {
                        vector: vector.clone(),
                        cached_at: Instant::now(),
                    },
                );
                results[idx] = Some(vector);
            }
        }

        Ok(results.into_iter().map(Option::unwrap_or_default).collect())
    }
}

#[async_trait]
impl<C: EmbeddingClient> EmbeddingClient for EmbeddingCache<C> {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_batch_cached(texts).await
    }

    fn dimension(&self) -> Option<usize> {
        self.inner.dimension()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingClient for CountingClient {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }

        fn dimension(&self) -> Option<usize> {
            Some(1)
        }
    }

    #[tokio::test]
    async fn repeated_text_hits_cache() {
        let client = CountingClient {
            calls: AtomicUsize::new(0),
        };
        let cache = EmbeddingCache::new(client, 10, Duration::from_secs(60));

        cache.embed_cached("hello").await.unwrap();
        cache.embed_cached("hello").await.unwrap();

        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 1);
        let metrics = cache.metrics();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
    }

    #[tokio::test]
    async fn trimmed_text_shares_cache_key() {
        assert_eq!(
            EmbeddingCache::<CountingClient>::key_for("  hello  "),
            EmbeddingCache::<CountingClient>::key_for("hello")
        );
    }

    #[tokio::test]
    async fn expired_entry_is_refetched() {
        let client = CountingClient {
            calls: AtomicUsize::new(0),
        };
        let cache = EmbeddingCache::new(client, 10, Duration::from_millis(1));
        cache.embed_cached("hello").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.embed_cached("hello").await.unwrap();
        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 2);
    }
}
