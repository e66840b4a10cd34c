//! `ask`: run a chat turn's system messages through the full placeholder
//! dispatch pipeline, against whatever diaries have already been persisted
//! to the state directory.

use crate::config::ResolvedConfig;
use crate::output::{Output, OutputFormat};
use anyhow::Context;
use async_trait::async_trait;
use rag_core::embedding::{EmbeddingClient, HttpEmbeddingClient, HttpEmbeddingConfig};
use rag_core::error::Result as EngineResult;
use rag_core::query_planner::DiaryRagSource;
use rag_core::rag_diary_store::{DiaryStorePersistence, RerankCandidate, Reranker};
use rag_core::semantic_group::SemanticGroupManager;
use rag_core::{ChatMessage, QueryPlanner, RagSource};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// A reranker that preserves pre-rerank order: candidate at batch index `i`
/// scores `len - i`, so the highest-scoring candidate after "reranking" is
/// exactly the one that was first before it. Used as the CLI's default since
/// wiring a real HTTP reranker would mean a second HTTP dependency beyond
/// the one the embedding client already carries.
struct PassthroughReranker;

#[async_trait]
impl Reranker for PassthroughReranker {
    async fn rerank(&self, _query: &str, candidates: &[RerankCandidate]) -> EngineResult<Vec<f32>> {
        let len = candidates.len();
        Ok(candidates.iter().map(|c| (len - c.index) as f32).collect())
    }
}

/// `rag-diary ask <message>`: discover persisted diaries, wire each into a
/// [`DiaryRagSource`], and dispatch `message` through [`QueryPlanner`].
pub async fn run(message: String, config: &ResolvedConfig, format: OutputFormat) -> anyhow::Result<()> {
    let dimension = config
        .engine
        .vectordb_dimension
        .context("vectordb_dimension must be set to run ask")?;

    let embedder: Arc<dyn EmbeddingClient> = Arc::new(
        HttpEmbeddingClient::new(HttpEmbeddingConfig {
            base_url: config.engine.api_url.clone().unwrap_or_default(),
            api_key: config.engine.api_key.clone().unwrap_or_default(),
            model: config
                .engine
                .whitelist_embedding_model
                .first()
                .cloned()
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            dimension: Some(dimension),
            ..Default::default()
        })
        .context("constructing embedding client")?,
    );

    let persistence = DiaryStorePersistence::new(&config.state_dir);
    let mut rag_sources: HashMap<String, Arc<dyn RagSource>> = HashMap::new();

    for diary in discover_diaries(&config.state_dir)? {
        let store = persistence.load(&diary, dimension, 1024).await;
        let source = DiaryRagSource::new(store, config.engine.clone(), Arc::new(PassthroughReranker));
        rag_sources.insert(diary, Arc::new(source));
    }

    let diary_count = rag_sources.len();
    let planner = QueryPlanner::new(
        embedder,
        rag_sources,
        None,
        None,
        SemanticGroupManager::default(),
        config.engine.clone(),
    );

    let messages = vec![
        ChatMessage { role: "user".to_string(), content: message.clone() },
        ChatMessage {
            role: "system".to_string(),
            content: "context: see configured diary placeholders".to_string(),
        },
    ];
    let processed = planner.process_system_messages(messages).await;

    let result = AskResult {
        message,
        diaries_loaded: diary_count,
        responses: processed.into_iter().map(|m| m.content).collect(),
    };
    format.print(&result)
}

fn discover_diaries(state_dir: &std::path::Path) -> anyhow::Result<Vec<String>> {
    let mut names = Vec::new();
    if !state_dir.exists() {
        return Ok(names);
    }
    for entry in std::fs::read_dir(state_dir)
        .with_context(|| format!("reading state directory {}", state_dir.display()))?
    {
        let entry = entry?;
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();
        if let Some(diary) = name.strip_suffix(".chunks.json") {
            names.push(diary.to_string());
        }
    }
    Ok(names)
}

#[derive(Debug, Serialize)]
struct AskResult {
    message: String,
    diaries_loaded: usize,
    responses: Vec<String>,
}

impl Output for AskResult {
    fn write_human<W: std::io::Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "loaded {} diary index(es)", self.diaries_loaded)?;
        for response in &self.responses {
            writeln!(writer, "{response}")?;
        }
        Ok(())
    }
}
