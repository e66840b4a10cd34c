//! The [`EmbeddingClient`] trait: the injected embedding capability.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

/// Batch text→vector calls to a remote embedding API.
///
/// Preserves input order. The caller owns caching — this trait
/// itself never caches; [`crate::embedding::EmbeddingCache`] wraps it.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed an ordered sequence of texts, returning vectors in the same
    /// order.
    ///
    /// # Errors
    /// - [`crate::Error::EmbeddingUnavailable`] on missing credentials.
    /// - [`crate::Error::EmbeddingTransient`] on HTTP 5xx / network errors,
    ///   already retried internally per the configured backoff policy.
    /// - [`crate::Error::EmbeddingFatal`] on HTTP 4xx.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text; default implementation batches through
    /// [`EmbeddingClient::embed`].
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut result = self.embed(std::slice::from_ref(&text.to_string())).await?;
        Ok(result.pop().unwrap_or_default())
    }

    /// Declared output dimensionality, when known ahead of a call.
    fn dimension(&self) -> Option<usize>;
}

/// Counters for embedding call outcomes: hits, misses, errors, and latency,
/// kept separate from any particular task's content.
#[derive(Debug, Default)]
pub struct EmbeddingMetrics {
    attempts: AtomicU64,
    retries: AtomicU64,
    failures: AtomicU64,
}

impl EmbeddingMetrics {
    /// Record one top-level `embed` call attempt.
    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one retry within an `embed` call.
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one terminal failure.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the current counters.
    #[must_use]
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.attempts.load(Ordering::Relaxed),
            self.retries.load(Ordering::Relaxed),
            self.failures.load(Ordering::Relaxed),
        )
    }
}
