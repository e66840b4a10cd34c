//! The rerank capability hook used by [`super::PerDiaryIndex::search_reranked`].

use crate::error::Result;
use async_trait::async_trait;

/// One candidate passed into a rerank batch, keeping its position in the
/// pre-rerank batch so scores can be zipped back onto the original hits.
#[derive(Debug, Clone)]
pub struct RerankCandidate {
    /// Index within the batch (not the global candidate list).
    pub index: usize,
    /// Candidate chunk text.
    pub text: String,
}

/// A rerank backend: given a query and a batch of candidates, returns one
/// score per candidate, same order as the input slice.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Score `candidates` against `query`. On success, returns exactly
    /// `candidates.len()` scores in the same order.
    ///
    /// # Errors
    /// Returns an error for any transport or provider failure; callers fall
    /// back to pre-rerank order for that batch.
    async fn rerank(&self, query: &str, candidates: &[RerankCandidate]) -> Result<Vec<f32>>;
}

#[cfg(test)]
pub(crate) struct NoopReranker;

#[cfg(test)]
#[async_trait]
impl Reranker for NoopReranker {
    async fn rerank(&self, _query: &str, candidates: &[RerankCandidate]) -> Result<Vec<f32>> {
        Ok(candidates.iter().map(|c| c.index as f32).collect())
    }
}
