//! Bridges a [`PerDiaryIndex`] into a [`RagSource`], so the planner can
//! dispatch placeholder resolution straight to an in-process diary store
//! without every diary needing its own bespoke retrieval backend.

use super::RagSource;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::rag_diary_store::{PerDiaryIndex, Reranker};
use crate::types::{SearchHit, TimeRange};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A [`RagSource`] backed by one in-process [`PerDiaryIndex`], guarded by an
/// `RwLock` since the planner dispatches searches concurrently while the
/// ingest path may still be upserting chunks into the same diary.
pub struct DiaryRagSource {
    store: RwLock<PerDiaryIndex>,
    config: EngineConfig,
    reranker: Arc<dyn Reranker>,
}

impl DiaryRagSource {
    /// Wrap `store` for dispatch, using `config.rerank_multiplier` /
    /// `config.rerank_max_tokens_per_batch` for reranked searches.
    #[must_use]
    pub fn new(store: PerDiaryIndex, config: EngineConfig, reranker: Arc<dyn Reranker>) -> Self {
        Self {
            store: RwLock::new(store),
            config,
            reranker,
        }
    }

    /// Mutable access to the wrapped store, for the ingest path to upsert
    /// chunks or set the diary's name vector.
    pub async fn with_store_mut<T>(&self, f: impl FnOnce(&mut PerDiaryIndex) -> T) -> T {
        let mut guard = self.store.write().await;
        f(&mut guard)
    }
}

#[async_trait]
impl RagSource for DiaryRagSource {
    async fn name_vector(&self, _diary: &str) -> Result<Option<Vec<f32>>> {
        Ok(self.store.read().await.get_name_vector().map(<[f32]>::to_vec))
    }

    async fn search(
        &self,
        _diary: &str,
        query_vec: &[f32],
        k: usize,
        tag_weight: Option<f32>,
        query_tags: &[String],
    ) -> Result<Vec<SearchHit>> {
        Ok(self.store.read().await.search(query_vec, k, tag_weight, query_tags))
    }

    async fn search_with_time(
        &self,
        _diary: &str,
        query_vec: &[f32],
        k: usize,
        tag_weight: Option<f32>,
        query_tags: &[String],
        ranges: &[TimeRange],
    ) -> Result<Vec<SearchHit>> {
        Ok(self
            .store
            .read()
            .await
            .search_with_time_ranges(query_vec, k, tag_weight, query_tags, ranges))
    }

    async fn search_reranked(
        &self,
        _diary: &str,
        query_vec: &[f32],
        k: usize,
        tag_weight: Option<f32>,
        query_tags: &[String],
    ) -> Result<Vec<SearchHit>> {
        let store = self.store.read().await;
        Ok(store
            .search_reranked(query_vec, k, tag_weight, query_tags, &self.config, self.reranker.as_ref())
            .await)
    }

    async fn whole_diary_text(&self, _diary: &str) -> Result<Vec<String>> {
        Ok(self.store.read().await.all_texts())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag_diary_store::RerankCandidate;
    use crate::types::Chunk;

    struct NoopReranker;

    #[async_trait]
    impl Reranker for NoopReranker {
        async fn rerank(&self, _query: &str, candidates: &[RerankCandidate]) -> Result<Vec<f32>> {
            Ok(candidates.iter().map(|c| c.index as f32).collect())
        }
    }

    #[tokio::test]
    async fn search_delegates_to_wrapped_store() {
        let mut store = PerDiaryIndex::new("A", 2, 16);
        store.upsert_chunk(Chunk::new("1", "hello", vec![1.0, 0.0])).unwrap();
        let source = DiaryRagSource::new(store, EngineConfig::default(), Arc::new(NoopReranker));

        let hits = source.search("A", &[1.0, 0.0], 1, None, &[]).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "hello");
    }

    #[tokio::test]
    async fn whole_diary_text_returns_every_chunk() {
        let mut store = PerDiaryIndex::new("A", 2, 16);
        store.upsert_chunk(Chunk::new("1", "one", vec![1.0, 0.0])).unwrap();
        store.upsert_chunk(Chunk::new("2", "two", vec![0.0, 1.0])).unwrap();
        let source = DiaryRagSource::new(store, EngineConfig::default(), Arc::new(NoopReranker));

        let mut texts = source.whole_diary_text("A").await.unwrap();
        texts.sort();
        assert_eq!(texts, vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn with_store_mut_allows_ingest_to_upsert() {
        let source = DiaryRagSource::new(
            PerDiaryIndex::new("A", 2, 16),
            EngineConfig::default(),
            Arc::new(NoopReranker),
        );
        source
            .with_store_mut(|store| store.upsert_chunk(Chunk::new("1", "added", vec![1.0, 0.0])))
            .await
            .unwrap();
        let hits = source.search("A", &[1.0, 0.0], 1, None, &[]).await.unwrap();
        assert_eq!(hits[0].text, "added");
    }
}
