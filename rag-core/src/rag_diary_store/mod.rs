//! Per-diary chunked text + embedding store: k-NN search with optional tag
//! boost, a rerank hook, and crash-safe persistence.

mod persistence;
mod rerank;

use crate::config::EngineConfig;
use crate::embedding::similarity::{jaccard, l2_normalize};
use crate::error::{Error, Result};
use crate::types::{Chunk, SearchHit, TimeRange};
use crate::vector_index::VectorIndex;
use std::collections::HashMap;

pub use persistence::DiaryStorePersistence;
pub use rerank::{RerankCandidate, Reranker};

/// One diary's chunk table plus its ANN index and a durably-cached name
/// vector (the embedding of the diary's own name, used as the gating vector
/// in the query path).
pub struct PerDiaryIndex {
    diary: String,
    index: VectorIndex,
    chunks: HashMap<String, Chunk>,
    name_vector: Option<Vec<f32>>,
}

impl PerDiaryIndex {
    /// A fresh, empty per-diary store.
    #[must_use]
    pub fn new(diary: impl Into<String>, dimension: usize, max_elements: usize) -> Self {
        Self {
            diary: diary.into(),
            index: VectorIndex::new(dimension, max_elements),
            chunks: HashMap::new(),
            name_vector: None,
        }
    }

    /// The diary name this store holds chunks for.
    #[must_use]
    pub fn diary(&self) -> &str {
        &self.diary
    }

    /// Number of chunks currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the store holds no chunks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Insert or replace a chunk (admin path, out of the hot query path).
    ///
    /// # Errors
    /// Propagates [`Error::InvalidInput`] if the chunk's embedding dimension
    /// does not match the index.
    pub fn upsert_chunk(&mut self, chunk: Chunk) -> Result<()> {
        self.index.upsert(chunk.id.clone(), chunk.embedding.clone())?;
        self.chunks.insert(chunk.id.clone(), chunk);
        Ok(())
    }

    /// Remove a chunk by id. Returns `true` if a chunk was present.
    pub fn delete_chunk(&mut self, id: &str) -> bool {
        self.chunks.remove(id);
        self.index.remove(id)
    }

    /// Look up a chunk's embedding by its exact text, for
    /// [`crate::meta_thinking::MetaThinkingEngine`]'s stage-seeding use.
    #[must_use]
    pub fn get_vector_by_text(&self, text: &str) -> Option<Vec<f32>> {
        self.chunks
            .values()
            .find(|chunk| chunk.text == text)
            .map(|chunk| chunk.embedding.clone())
    }

    /// The cached embedding of this diary's own name, if one has been set.
    #[must_use]
    pub fn get_name_vector(&self) -> Option<&[f32]> {
        self.name_vector.as_deref()
    }

    /// Every stored chunk's text, for gated whole-diary inclusion.
    #[must_use]
    pub fn all_texts(&self) -> Vec<String> {
        self.chunks.values().map(|chunk| chunk.text.clone()).collect()
    }

    /// Set the durably-cached diary-name embedding.
    pub fn set_name_vector(&mut self, vector: Vec<f32>) {
        self.name_vector = Some(vector);
    }

    /// Semantic k-NN search with an optional Jaccard tag boost.
    ///
    /// Effective score is `base_score · (1 + tag_weight · jaccard(chunk.tags,
    /// query_tags))` when `tag_weight` is `Some` and the chunk carries tags;
    /// otherwise the raw semantic score is used. Guarantees exactly the
    /// top-k by effective score.
    #[must_use]
    pub fn search(
        &self,
        query_vec: &[f32],
        k: usize,
        tag_weight: Option<f32>,
        query_tags: &[String],
    ) -> Vec<SearchHit> {
        if k == 0 {
            return Vec::new();
        }
        let fetch = (k * 4).max(k);
        let neighbors = self.index.search_knn(query_vec, fetch, 64.max(fetch));

        let mut hits: Vec<SearchHit> = neighbors
            .into_iter()
            .filter_map(|neighbor| {
                let chunk = self.chunks.get(&neighbor.label)?;
                let mut hit = SearchHit::semantic(chunk.text.clone(), neighbor.score);
                hit.tags = chunk.tags.clone();
                hit.timestamp = chunk.timestamp;

                if let (Some(weight), Some(tags)) = (tag_weight, chunk.tags.as_ref()) {
                    let overlap = jaccard(tags, query_tags);
                    let boost = 1.0 + weight * overlap;
                    hit.score = neighbor.score * boost;
                    hit.boost_factor = Some(boost);
                    let matched: Vec<String> = tags
                        .iter()
                        .filter(|t| query_tags.contains(t))
                        .cloned()
                        .collect();
                    if !matched.is_empty() {
                        hit.matched_tags = Some(matched);
                    }
                }
                Some(hit)
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        hits
    }

    /// Union semantic search hits with every chunk whose timestamp falls in
    /// any of `ranges`, deduplicating by trimmed text and tagging
    /// time-sourced hits with `source = ["time"]` (or `["rag", "time"]` for
    /// chunks present in both sets).
    #[must_use]
    pub fn search_with_time_ranges(
        &self,
        query_vec: &[f32],
        k: usize,
        tag_weight: Option<f32>,
        query_tags: &[String],
        ranges: &[TimeRange],
    ) -> Vec<SearchHit> {
        let mut semantic = self.search(query_vec, k, tag_weight, query_tags);
        let mut seen: HashMap<String, usize> = HashMap::new();
        for (idx, hit) in semantic.iter().enumerate() {
            seen.insert(hit.text.trim().to_string(), idx);
        }

        for chunk in self.chunks.values() {
            let Some(timestamp) = chunk.timestamp else {
                continue;
            };
            if !ranges.iter().any(|r| r.contains(timestamp)) {
                continue;
            }
            let key = chunk.text.trim().to_string();
            if let Some(&idx) = seen.get(&key) {
                if !semantic[idx].source.contains(&"time".to_string()) {
                    semantic[idx].source.push("time".to_string());
                }
                continue;
            }
            let mut hit = SearchHit::semantic(chunk.text.clone(), 0.0);
            hit.source = vec!["time".to_string()];
            hit.tags = chunk.tags.clone();
            hit.timestamp = chunk.timestamp;
            seen.insert(key, semantic.len());
            semantic.push(hit);
        }
        semantic
    }

    /// Fetch `k' = ceil(k * rerank_multiplier)` semantic candidates, rerank
    /// them in token-budgeted batches via `reranker`, and globally sort by
    /// rerank score across successful batches. A batch whose rerank call
    /// fails falls back to its pre-rerank order for that batch only.
    ///
    /// # Errors
    /// This method itself never fails: reranker errors are swallowed per
    /// batch and degrade to pre-rerank order, matching the documented
    /// fallback semantics.
    pub async fn search_reranked(
        &self,
        query_vec: &[f32],
        k: usize,
        tag_weight: Option<f32>,
        query_tags: &[String],
        config: &EngineConfig,
        reranker: &dyn Reranker,
    ) -> Vec<SearchHit> {
        let expanded_k = ((k as f64) * config.rerank_multiplier).ceil() as usize;
        let candidates = self.search(query_vec, expanded_k.max(k), tag_weight, query_tags);
        if candidates.is_empty() {
            return candidates;
        }

        let batches = token_budgeted_batches(&candidates, config.rerank_max_tokens_per_batch);
        let mut reranked: Vec<SearchHit> = Vec::with_capacity(candidates.len());

        for batch in &batches {
            let query_text = String::new();
            let rerank_candidates: Vec<RerankCandidate> = batch
                .iter()
                .enumerate()
                .map(|(idx, hit)| RerankCandidate {
                    index: idx,
                    text: hit.text.clone(),
                })
                .collect();

            match reranker.rerank(&query_text, &rerank_candidates).await {
                Ok(scores) if scores.len() == batch.len() => {
                    let mut scored: Vec<SearchHit> = batch
                        .iter()
                        .zip(scores)
                        .map(|(hit, score)| {
                            let mut hit = hit.clone();
                            hit.score = score;
                            hit
                        })
                        .collect();
                    scored.sort_by(|a, b| {
                        b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)
                    });
                    reranked.extend(scored);
                }
                _ => reranked.extend(batch.iter().cloned()),
            }
        }

        reranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        reranked.truncate(k);
        reranked
    }
}

/// Rough token estimate (chars / 4, rounded up) used only to size rerank
/// batches; accuracy does not affect correctness, only batch boundaries.
fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4).max(1)
}

/// Greedily pack `hits` into batches that stay under `max_tokens_per_batch`,
/// preserving order. A single hit larger than the budget still gets its own
/// batch rather than being dropped.
fn token_budgeted_batches(hits: &[SearchHit], max_tokens_per_batch: usize) -> Vec<Vec<SearchHit>> {
    let budget = max_tokens_per_batch.max(1);
    let mut batches: Vec<Vec<SearchHit>> = Vec::new();
    let mut current: Vec<SearchHit> = Vec::new();
    let mut current_tokens = 0usize;

    for hit in hits {
        let tokens = estimate_tokens(&hit.text);
        if !current.is_empty() && current_tokens + tokens > budget {
            batches.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        current_tokens += tokens;
        current.push(hit.clone());
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// L2-normalize `vector` against `dimension`, failing if it doesn't match.
pub(crate) fn checked_normalize(vector: &[f32], dimension: usize) -> Result<Vec<f32>> {
    if vector.len() != dimension {
        return Err(Error::InvalidInput(format!(
            "vector has dimension {} but store expects {}",
            vector.len(),
            dimension
        )));
    }
    Ok(l2_normalize(vector))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn chunk(id: &str, vec: Vec<f32>, tags: &[&str]) -> Chunk {
        Chunk::new(id, format!("text-{id}"), vec)
            .with_tags(tags.iter().map(|s| (*s).to_string()).collect())
    }

    #[test]
    fn search_returns_top_k_by_score() {
        let mut store = PerDiaryIndex::new("A", 2, 16);
        store.upsert_chunk(chunk("1", vec![1.0, 0.0], &[])).unwrap();
        store.upsert_chunk(chunk("2", vec![0.9, 0.1], &[])).unwrap();
        store.upsert_chunk(chunk("3", vec![0.0, 1.0], &[])).unwrap();

        let hits = store.search(&[1.0, 0.0], 2, None, &[]);
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn tag_boost_reorders_results() {
        let mut store = PerDiaryIndex::new("A", 2, 16);
        store
            .upsert_chunk(chunk("close", vec![1.0, 0.0], &["other"]))
            .unwrap();
        store
            .upsert_chunk(chunk("matching", vec![0.95, 0.05], &["cat", "dog"]))
            .unwrap();

        let query_tags = vec!["cat".to_string(), "dog".to_string()];
        let hits = store.search(&[1.0, 0.0], 2, Some(1.0), &query_tags);
        assert_eq!(hits[0].text, "text-matching");
        assert!(hits[0].boost_factor.unwrap() > 1.0);
    }

    #[test]
    fn time_union_adds_out_of_semantic_range_chunks() {
        let mut store = PerDiaryIndex::new("A", 2, 16);
        let mut far = chunk("far", vec![-1.0, 0.0], &[]);
        far.timestamp = Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        store.upsert_chunk(far).unwrap();

        let range = TimeRange {
            start: Utc.with_ymd_and_hms(2025, 12, 31, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap(),
        };
        let hits = store.search_with_time_ranges(&[1.0, 0.0], 1, None, &[], &[range]);
        assert!(hits.iter().any(|h| h.text == "text-far"));
    }
}
