//! Unified metrics registry, exported in Prometheus exposition format.

use crate::embedding::EmbeddingMetrics;
use crate::query_planner::cache::QueryCacheMetrics;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Per-placeholder-kind dispatch counters.
#[derive(Debug, Default)]
pub struct PlaceholderCounters {
    rag: AtomicU64,
    gated_include: AtomicU64,
    hybrid: AtomicU64,
    meta_thinking: AtomicU64,
    circular_reference: AtomicU64,
    gate_rejected: AtomicU64,
    placeholder_failures: AtomicU64,
}

impl PlaceholderCounters {
    pub fn record_rag(&self) {
        self.rag.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_gated_include(&self) {
        self.gated_include.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_hybrid(&self) {
        self.hybrid.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_meta_thinking(&self) {
        self.meta_thinking.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_circular_reference(&self) {
        self.circular_reference.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_gate_rejected(&self) {
        self.gate_rejected.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_placeholder_failure(&self) {
        self.placeholder_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// Aggregates every subsystem's counters and renders them as Prometheus
/// text, combining embedding and placeholder-dispatch counters into one
/// `/metrics` payload.
#[derive(Debug, Default, Clone)]
pub struct EngineMetrics {
    embedding: Arc<EmbeddingMetrics>,
    placeholders: Arc<PlaceholderCounters>,
}

impl EngineMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn embedding(&self) -> &Arc<EmbeddingMetrics> {
        &self.embedding
    }

    #[must_use]
    pub fn placeholders(&self) -> &Arc<PlaceholderCounters> {
        &self.placeholders
    }

    /// Render every counter as Prometheus exposition text, folding in the
    /// query cache's own hit/miss counters (owned by
    /// [`crate::query_planner::QueryPlanner`], passed in at export time).
    #[must_use]
    pub fn export(&self, query_cache: &QueryCacheMetrics) -> String {
        let mut out = String::with_capacity(2048);
        let (attempts, retries, failures) = self.embedding.snapshot();

        writeln!(out, "# HELP rag_embedding_attempts_total Total embedding call attempts").ok();
        writeln!(out, "# TYPE rag_embedding_attempts_total counter").ok();
        writeln!(out, "rag_embedding_attempts_total {attempts}").ok();

        writeln!(out, "# HELP rag_embedding_retries_total Total embedding call retries").ok();
        writeln!(out, "# TYPE rag_embedding_retries_total counter").ok();
        writeln!(out, "rag_embedding_retries_total {retries}").ok();

        writeln!(out, "# HELP rag_embedding_failures_total Total terminal embedding failures").ok();
        writeln!(out, "# TYPE rag_embedding_failures_total counter").ok();
        writeln!(out, "rag_embedding_failures_total {failures}").ok();

        writeln!(out, "# HELP rag_query_cache_hits_total Query result cache hits").ok();
        writeln!(out, "# TYPE rag_query_cache_hits_total counter").ok();
        writeln!(out, "rag_query_cache_hits_total {}", query_cache.hits).ok();

        writeln!(out, "# HELP rag_query_cache_misses_total Query result cache misses").ok();
        writeln!(out, "# TYPE rag_query_cache_misses_total counter").ok();
        writeln!(out, "rag_query_cache_misses_total {}", query_cache.misses).ok();

        writeln!(out, "# HELP rag_query_cache_hit_rate Query result cache hit rate").ok();
        writeln!(out, "# TYPE rag_query_cache_hit_rate gauge").ok();
        writeln!(out, "rag_query_cache_hit_rate {:.4}", query_cache.hit_rate()).ok();

        self.export_placeholder_counters(&mut out);
        out
    }

    fn export_placeholder_counters(&self, out: &mut String) {
        let counters = [
            ("rag_placeholder_rag_total", self.placeholders.rag.load(Ordering::Relaxed)),
            (
                "rag_placeholder_gated_include_total",
                self.placeholders.gated_include.load(Ordering::Relaxed),
            ),
            ("rag_placeholder_hybrid_total", self.placeholders.hybrid.load(Ordering::Relaxed)),
            (
                "rag_placeholder_meta_thinking_total",
                self.placeholders.meta_thinking.load(Ordering::Relaxed),
            ),
            (
                "rag_placeholder_circular_reference_total",
                self.placeholders.circular_reference.load(Ordering::Relaxed),
            ),
            (
                "rag_placeholder_gate_rejected_total",
                self.placeholders.gate_rejected.load(Ordering::Relaxed),
            ),
            (
                "rag_placeholder_failures_total",
                self.placeholders.placeholder_failures.load(Ordering::Relaxed),
            ),
        ];
        for (name, value) in counters {
            writeln!(out, "# TYPE {name} counter").ok();
            writeln!(out, "{name} {value}").ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_includes_every_counter_family() {
        let metrics = EngineMetrics::new();
        metrics.placeholders().record_rag();
        metrics.placeholders().record_circular_reference();
        metrics.embedding().record_attempt();

        let cache_metrics = QueryCacheMetrics { hits: 3, misses: 1 };
        let rendered = metrics.export(&cache_metrics);

        assert!(rendered.contains("rag_embedding_attempts_total 1"));
        assert!(rendered.contains("rag_query_cache_hits_total 3"));
        assert!(rendered.contains("rag_placeholder_rag_total 1"));
        assert!(rendered.contains("rag_placeholder_circular_reference_total 1"));
    }
}
