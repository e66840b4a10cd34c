//! End-to-end placeholder dispatch: embed a query, gate it against a
//! diary's cached name vector, retrieve chunks through a `DiaryRagSource`,
//! and splice the rendered result into a system message.

use async_trait::async_trait;
use rag_core::config::EngineConfig;
use rag_core::embedding::EmbeddingClient;
use rag_core::error::Result;
use rag_core::query_planner::DiaryRagSource;
use rag_core::rag_diary_store::{PerDiaryIndex, RerankCandidate, Reranker};
use rag_core::semantic_group::SemanticGroupManager;
use rag_core::types::Chunk;
use rag_core::{ChatMessage, QueryPlanner, RagSource};
use std::collections::HashMap;
use std::sync::Arc;

/// A deterministic fake: maps known strings to fixed vectors so gating and
/// ranking behave predictably without a network call.
struct FixedEmbedder;

#[async_trait]
impl EmbeddingClient for FixedEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                if text.contains("爬山") {
                    vec![1.0, 0.0]
                } else if text.contains("旅行") {
                    vec![0.9, 0.1]
                } else {
                    vec![0.0, 1.0]
                }
            })
            .collect())
    }

    fn dimension(&self) -> Option<usize> {
        Some(2)
    }
}

struct PassthroughReranker;

#[async_trait]
impl Reranker for PassthroughReranker {
    async fn rerank(&self, _query: &str, candidates: &[RerankCandidate]) -> Result<Vec<f32>> {
        let len = candidates.len();
        Ok(candidates.iter().map(|c| (len - c.index) as f32).collect())
    }
}

fn config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.api_url = Some("https://example.com".to_string());
    config.api_key = Some("test-key".to_string());
    config.vectordb_dimension = Some(2);
    config.rag_gate_threshold = 0.5;
    config
}

async fn travel_source() -> Arc<dyn RagSource> {
    let mut store = PerDiaryIndex::new("旅行", 2, 16);
    store
        .upsert_chunk(Chunk::new("1", "周末去爬山看了日出", vec![1.0, 0.0]))
        .unwrap();
    store
        .upsert_chunk(Chunk::new("2", "在酒店写了明信片", vec![0.9, 0.1]))
        .unwrap();
    store.set_name_vector(vec![0.95, 0.05]);

    Arc::new(DiaryRagSource::new(store, config(), Arc::new(PassthroughReranker)))
}

#[tokio::test]
async fn rag_placeholder_resolves_against_a_matching_diary() {
    let mut rag_sources: HashMap<String, Arc<dyn RagSource>> = HashMap::new();
    rag_sources.insert("旅行".to_string(), travel_source().await);

    let planner = QueryPlanner::new(
        Arc::new(FixedEmbedder),
        rag_sources,
        None,
        None,
        SemanticGroupManager::default(),
        config(),
    );

    let messages = vec![
        ChatMessage { role: "user".to_string(), content: "这周末爬山怎么样".to_string() },
        ChatMessage {
            role: "system".to_string(),
            content: "context: [[旅行日记本]]".to_string(),
        },
    ];

    let processed = planner.process_system_messages(messages).await;
    let system = &processed[1];
    assert!(system.content.contains("周末去爬山看了日出"));
    assert!(system.content.contains("从\"旅行日记本\"中检索到的相关记忆片段"));
}

#[tokio::test]
async fn rag_placeholder_on_unconfigured_diary_reports_failure() {
    let rag_sources: HashMap<String, Arc<dyn RagSource>> = HashMap::new();

    let planner = QueryPlanner::new(
        Arc::new(FixedEmbedder),
        rag_sources,
        None,
        None,
        SemanticGroupManager::default(),
        config(),
    );

    let messages = vec![
        ChatMessage { role: "user".to_string(), content: "这周末爬山怎么样".to_string() },
        ChatMessage { role: "system".to_string(), content: "context: [[旅行日记本]]".to_string() },
    ];

    let processed = planner.process_system_messages(messages).await;
    assert!(processed[1].content.contains("未配置日记本"));
}

#[tokio::test]
async fn gate_blocks_retrieval_for_an_unrelated_query() {
    let mut rag_sources: HashMap<String, Arc<dyn RagSource>> = HashMap::new();
    rag_sources.insert("旅行".to_string(), travel_source().await);

    let planner = QueryPlanner::new(
        Arc::new(FixedEmbedder),
        rag_sources,
        None,
        None,
        SemanticGroupManager::default(),
        config(),
    );

    let messages = vec![
        ChatMessage { role: "user".to_string(), content: "今天工作进度如何".to_string() },
        ChatMessage { role: "system".to_string(), content: "context: [[旅行日记本]]".to_string() },
    ];

    let processed = planner.process_system_messages(messages).await;
    assert_eq!(processed[1].content, "context: ");
}

#[tokio::test]
async fn gated_include_returns_every_chunk_in_the_diary() {
    let mut rag_sources: HashMap<String, Arc<dyn RagSource>> = HashMap::new();
    rag_sources.insert("旅行".to_string(), travel_source().await);

    let planner = QueryPlanner::new(
        Arc::new(FixedEmbedder),
        rag_sources,
        None,
        None,
        SemanticGroupManager::default(),
        config(),
    );

    let messages = vec![
        ChatMessage { role: "user".to_string(), content: "这周末爬山怎么样".to_string() },
        ChatMessage { role: "system".to_string(), content: "<<旅行日记本>>".to_string() },
    ];

    let processed = planner.process_system_messages(messages).await;
    assert!(processed[1].content.contains("周末去爬山看了日出"));
    assert!(processed[1].content.contains("在酒店写了明信片"));
}
