//! Executes a configured cluster-chain as a recursive, vector-refined
//! retrieval pipeline.

use crate::embedding::similarity::{cosine_similarity, l2_normalize};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// One search hit returned by a cluster, carrying its own embedding so the
/// engine can blend a stage's mean result vector into the next stage's
/// query.
#[derive(Debug, Clone)]
pub struct StageHit {
    pub text: String,
    pub score: f32,
    pub vector: Vec<f32>,
}

/// The capability a cluster name resolves to: search it with a query
/// vector and get back scored, vectored hits.
#[async_trait]
pub trait ClusterSearch: Send + Sync {
    /// Search `cluster` with `query_vec`, returning up to `k` hits.
    ///
    /// # Errors
    /// Any failure stops the chain at this stage: the error is recorded and
    /// the chain does not continue to the next stage.
    async fn search(&self, cluster: &str, query_vec: &[f32], k: usize) -> Result<Vec<StageHit>>;
}

/// A named sequence of cluster names to visit in order.
#[derive(Debug, Clone)]
pub struct MetaThinkingChain {
    pub name: String,
    pub stages: Vec<String>,
}

/// A pre-embedded theme vector used by auto mode to pick a chain.
#[derive(Debug, Clone)]
pub struct ThemeVector {
    pub chain_name: String,
    pub vector: Vec<f32>,
}

/// Report for one stage of a chain run.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub cluster: String,
    pub hits: Vec<StageHit>,
    pub degraded: bool,
}

/// Full report for a chain run.
#[derive(Debug, Clone)]
pub struct MetaThinkingReport {
    pub chain_name: String,
    pub stages: Vec<StageReport>,
    /// Set if a stage raised an error; the chain stopped at that point.
    pub error: Option<String>,
}

/// Blend weight applied to the original query vector when mixing in a
/// stage's mean result vector: 0.8 query + 0.2 mean.
const QUERY_BLEND_WEIGHT: f32 = 0.8;
const MEAN_BLEND_WEIGHT: f32 = 0.2;

/// Holds configured chains and theme vectors, and runs chains against a
/// [`ClusterSearch`] backend.
#[derive(Default)]
pub struct MetaThinkingEngine {
    chains: HashMap<String, MetaThinkingChain>,
    themes: Vec<ThemeVector>,
    auto_threshold: f32,
}

impl MetaThinkingEngine {
    /// An engine over `chains` and `themes`, routing auto mode below
    /// `auto_threshold` to the chain named `"default"`.
    #[must_use]
    pub fn new(chains: Vec<MetaThinkingChain>, themes: Vec<ThemeVector>, auto_threshold: f32) -> Self {
        Self {
            chains: chains.into_iter().map(|c| (c.name.clone(), c)).collect(),
            themes,
            auto_threshold,
        }
    }

    /// Resolve which chain name to run in auto mode: the chain whose theme
    /// vector maximizes cosine similarity with `query_vec`, or `"default"`
    /// if the best score is below `auto_threshold`.
    #[must_use]
    pub fn resolve_auto_chain(&self, query_vec: &[f32]) -> String {
        let best = self
            .themes
            .iter()
            .map(|theme| (theme, cosine_similarity(query_vec, &theme.vector)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        match best {
            Some((theme, score)) if score >= self.auto_threshold => theme.chain_name.clone(),
            _ => "default".to_string(),
        }
    }

    /// Run `chain_name`'s stages left to right, seeding stage 0 with
    /// `query_vec` and `k_sequence[0]`.
    ///
    /// # Errors
    /// Returns [`crate::error::Error::NotFound`] if `chain_name` is not a
    /// configured chain.
    pub async fn run(
        &self,
        chain_name: &str,
        k_sequence: &[usize],
        query_vec: &[f32],
        searcher: &dyn ClusterSearch,
    ) -> Result<MetaThinkingReport> {
        let chain = self.chains.get(chain_name).ok_or_else(|| {
            crate::error::Error::NotFound(format!("meta-thinking chain '{chain_name}'"))
        })?;

        let mut report = MetaThinkingReport {
            chain_name: chain.name.clone(),
            stages: Vec::new(),
            error: None,
        };
        let mut current_query = query_vec.to_vec();

        for (idx, cluster) in chain.stages.iter().enumerate() {
            let k = k_sequence.get(idx).copied().unwrap_or(1).max(1);
            match searcher.search(cluster, &current_query, k).await {
                Ok(hits) => {
                    let degraded = hits.is_empty();
                    if !degraded && idx + 1 < chain.stages.len() {
                        let mean = mean_vector(&hits);
                        current_query = blend(query_vec, &mean);
                    }
                    report.stages.push(StageReport {
                        cluster: cluster.clone(),
                        hits,
                        degraded,
                    });
                }
                Err(error) => {
                    report.error = Some(error.to_string());
                    break;
                }
            }
        }

        Ok(report)
    }
}

fn mean_vector(hits: &[StageHit]) -> Vec<f32> {
    let dim = hits.first().map_or(0, |h| h.vector.len());
    let mut sum = vec![0.0f32; dim];
    for hit in hits {
        if hit.vector.len() != dim {
            continue;
        }
        for (slot, value) in sum.iter_mut().zip(&hit.vector) {
            *slot += value;
        }
    }
    let count = hits.len().max(1) as f32;
    sum.iter().map(|v| v / count).collect()
}

fn blend(query: &[f32], mean: &[f32]) -> Vec<f32> {
    if mean.len() != query.len() || mean.is_empty() {
        return query.to_vec();
    }
    let blended: Vec<f32> = query
        .iter()
        .zip(mean)
        .map(|(q, m)| QUERY_BLEND_WEIGHT * q + MEAN_BLEND_WEIGHT * m)
        .collect();
    l2_normalize(&blended)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSearcher {
        calls: AtomicUsize,
        fail_at: Option<usize>,
    }

    #[async_trait]
    impl ClusterSearch for FakeSearcher {
        async fn search(&self, cluster: &str, _query: &[f32], k: usize) -> Result<Vec<StageHit>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_at == Some(call) {
                return Err(Error::External(anyhow::anyhow!("boom")));
            }
            if cluster == "empty" {
                return Ok(Vec::new());
            }
            Ok((0..k)
                .map(|i| StageHit {
                    text: format!("{cluster}-{i}"),
                    score: 1.0,
                    vector: vec![1.0, 0.0],
                })
                .collect())
        }
    }

    fn engine() -> MetaThinkingEngine {
        MetaThinkingEngine::new(
            vec![
                MetaThinkingChain {
                    name: "default".to_string(),
                    stages: vec!["a".to_string(), "b".to_string()],
                },
                MetaThinkingChain {
                    name: "creative_writing".to_string(),
                    stages: vec!["creative".to_string()],
                },
            ],
            vec![ThemeVector {
                chain_name: "creative_writing".to_string(),
                vector: vec![0.0, 1.0],
            }],
            0.65,
        )
    }

    #[tokio::test]
    async fn chain_runs_all_stages_and_blends_query() {
        let engine = engine();
        let searcher = FakeSearcher { calls: AtomicUsize::new(0), fail_at: None };
        let report = engine.run("default", &[2, 2], &[1.0, 0.0], &searcher).await.unwrap();
        assert_eq!(report.stages.len(), 2);
        assert!(!report.stages[0].degraded);
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn empty_stage_marks_degraded_but_continues() {
        let engine = MetaThinkingEngine::new(
            vec![MetaThinkingChain {
                name: "default".to_string(),
                stages: vec!["empty".to_string(), "a".to_string()],
            }],
            vec![],
            0.65,
        );
        let searcher = FakeSearcher { calls: AtomicUsize::new(0), fail_at: None };
        let report = engine.run("default", &[1, 1], &[1.0, 0.0], &searcher).await.unwrap();
        assert!(report.stages[0].degraded);
        assert_eq!(report.stages.len(), 2);
    }

    #[tokio::test]
    async fn stage_error_stops_the_chain() {
        let engine = engine();
        let searcher = FakeSearcher { calls: AtomicUsize::new(0), fail_at: Some(0) };
        let report = engine.run("default", &[1, 1], &[1.0, 0.0], &searcher).await.unwrap();
        assert!(report.error.is_some());
        assert!(report.stages.is_empty());
    }

    #[test]
    fn auto_mode_routes_above_threshold_query_to_matching_theme() {
        let engine = engine();
        assert_eq!(engine.resolve_auto_chain(&[0.0, 1.0]), "creative_writing");
    }

    #[test]
    fn auto_mode_falls_back_to_default_below_threshold() {
        let engine = engine();
        assert_eq!(engine.resolve_auto_chain(&[0.5, 0.5]), "default");
    }
}
