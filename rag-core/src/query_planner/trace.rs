//! Structured trace events emitted per retrieval, for observability tooling
//! that wants to see why a placeholder expanded the way it did.

use super::modifiers::Modifiers;
use crate::types::{SearchHit, TimeRange};
use serde::Serialize;

/// Aggregated tag statistics attached to a trace event when `TagMemo` was
/// active.
#[derive(Debug, Clone, Serialize)]
pub struct TagStats {
    pub tag_weight: f32,
    pub matched_chunk_count: usize,
    pub distinct_tags_matched: usize,
}

/// One structured record of a single placeholder's retrieval, suitable for
/// logging via `tracing` as a structured field or shipping to an external
/// trace sink.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub placeholder_db_name: String,
    pub query_text: String,
    pub effective_k: usize,
    pub flags: Modifiers,
    pub time_ranges: Vec<TimeRange>,
    pub results: Vec<SearchHit>,
    pub tag_stats: Option<TagStats>,
}

impl TraceEvent {
    /// Emit this event as a single structured `tracing` debug record.
    pub fn emit(&self) {
        tracing::debug!(
            placeholder = %self.placeholder_db_name,
            k = self.effective_k,
            result_count = self.results.len(),
            time_range_count = self.time_ranges.len(),
            "retrieval trace event"
        );
    }
}
