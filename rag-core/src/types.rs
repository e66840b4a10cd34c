//! Shared data types for the RAG diary engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A unit of semantic retrieval inside one diary.
///
/// Chunks are produced externally (chunking strategy is out of scope); the
/// core treats them as opaque text + vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Stable identifier, unique within a diary.
    pub id: String,
    /// Chunk text.
    pub text: String,
    /// Embedding vector for `text`.
    pub embedding: Vec<f32>,
    /// Tags inherited from the originating file's `Tag:` line, if any.
    pub tags: Option<Vec<String>>,
    /// Timestamp parsed from the originating file's date header, if any.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Chunk {
    /// Construct a chunk with no tags or timestamp.
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            embedding,
            tags: None,
            timestamp: None,
        }
    }

    /// Attach tags to the chunk (builder style).
    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Attach a timestamp to the chunk (builder style).
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// A single candidate returned from a k-NN search, before formatting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    /// Chunk text (what gets rendered as a bullet in the formatted output).
    pub text: String,
    /// Effective score after any tag boost or rerank has been applied.
    pub score: f32,
    /// Which retrieval path produced this hit: `"rag"`, `"time"`, or both.
    pub source: Vec<String>,
    /// Tags carried by the originating chunk, if any.
    pub tags: Option<Vec<String>>,
    /// Tags that matched the query's tag set, when tag boost was active.
    pub matched_tags: Option<Vec<String>>,
    /// Multiplicative boost factor applied by the Jaccard tag-boost, if any.
    pub boost_factor: Option<f32>,
    /// Originating chunk timestamp, if any (used for date-desc sort in the
    /// time-aware combined framing).
    pub timestamp: Option<DateTime<Utc>>,
}

impl SearchHit {
    /// A bare semantic hit with no boost or time component.
    #[must_use]
    pub fn semantic(text: impl Into<String>, score: f32) -> Self {
        Self {
            text: text.into(),
            score,
            source: vec!["rag".to_string()],
            tags: None,
            matched_tags: None,
            boost_factor: None,
            timestamp: None,
        }
    }
}

/// A half-open day interval `[start, end)`, as returned by
/// [`crate::time_parser::TimeExpressionParser`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TimeRange {
    /// Inclusive start of the interval, at midnight in the configured zone.
    pub start: DateTime<Utc>,
    /// Exclusive end of the interval.
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Whether `timestamp` falls within `[start, end)`.
    #[must_use]
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp < self.end
    }
}
