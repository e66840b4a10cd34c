//! Error taxonomy for the RAG diary engine.
//!
//! Errors are caught at the narrowest boundary that still allows meaningful
//! substitution. Nothing in this crate panics out of
//! `process_system_messages`; failures downgrade to the fixed user-visible
//! substitution strings defined in [`crate::query_planner::format`].

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the RAG diary engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing mandatory env/config; fatal to the affected component, not to
    /// the planner as a whole.
    #[error("configuration invalid: {0}")]
    ConfigInvalid(String),

    /// Missing credentials for the embedding provider.
    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Transient embedding failure (HTTP 5xx, network error); retried with
    /// increasing backoff by the caller.
    #[error("embedding provider transient error: {0}")]
    EmbeddingTransient(String),

    /// Fatal embedding failure (HTTP 4xx); not retried.
    #[error("embedding provider fatal error: {0}")]
    EmbeddingFatal(String),

    /// Checksum/dimension mismatch or label↔tag inconsistency. The affected
    /// tag is treated as "has no vector" and queued for re-vectorization.
    #[error("index corrupt: {0}")]
    IndexCorrupt(String),

    /// ANN index is at `max_elements`; recoverable via `resize`.
    #[error("capacity exceeded: current={current}, max={max}")]
    CapacityExceeded {
        /// Current element count in the index.
        current: usize,
        /// Configured maximum capacity.
        max: usize,
    },

    /// Detected at startup; triggers a background resync, not fatal.
    #[error("tag cooccurrence store inconsistent: {0}")]
    CooccurrenceInconsistent(String),

    /// Shard write failure; temp files are cleaned, retried on the next
    /// debounce tick, `dirty_shards` retained.
    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    /// Normal shutdown or client cancellation.
    #[error("operation cancelled")]
    Cancelled,

    /// Generic storage I/O failure not covered by a more specific variant.
    #[error("storage error: {0}")]
    Storage(String),

    /// Malformed user input (e.g. an unparseable placeholder modifier).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A referenced named entity (chain, diary) was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// JSON (de)serialization failure for an on-disk artifact.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for provider-boundary failures (HTTP client, rerank
    /// capability) that do not need a dedicated variant.
    #[error("external error: {0}")]
    External(#[from] anyhow::Error),
}

impl Error {
    /// Whether this error is recoverable by retrying with backoff.
    ///
    /// Used by the embedding retry loop and the shard persister's
    /// retry-on-next-tick behavior.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::EmbeddingTransient(_)
                | Error::PersistenceFailed(_)
                | Error::CooccurrenceInconsistent(_)
                | Error::Storage(_)
                | Error::Io(_)
        )
    }

    /// Whether this error should short-circuit the current placeholder
    /// rather than be retried.
    #[must_use]
    pub fn is_fatal_to_placeholder(&self) -> bool {
        matches!(
            self,
            Error::EmbeddingFatal(_)
                | Error::EmbeddingUnavailable(_)
                | Error::InvalidInput(_)
                | Error::NotFound(_)
        )
    }

    /// Render the fixed `[处理失败: <msg>]` substitution string for a
    /// per-placeholder failure.
    #[must_use]
    pub fn to_placeholder_failure(&self) -> String {
        format!("[处理失败: {self}]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_embedding_errors_are_recoverable() {
        let err = Error::EmbeddingTransient("503".to_string());
        assert!(err.is_recoverable());
        assert!(!err.is_fatal_to_placeholder());
    }

    #[test]
    fn fatal_embedding_errors_are_not_recoverable() {
        let err = Error::EmbeddingFatal("401".to_string());
        assert!(!err.is_recoverable());
        assert!(err.is_fatal_to_placeholder());
    }

    #[test]
    fn placeholder_failure_string_matches_fixed_template() {
        let err = Error::NotFound("creative_writing".to_string());
        let rendered = err.to_placeholder_failure();
        assert!(rendered.starts_with("[处理失败: "));
        assert!(rendered.ends_with(']'));
    }
}
