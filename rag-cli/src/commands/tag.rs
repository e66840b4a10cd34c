//! `tag`: inspect the global tag vocabulary without touching diary content.

use crate::config::ResolvedConfig;
use crate::output::{Output, OutputFormat};
use anyhow::Context;
use rag_core::embedding::{EmbeddingClient, HttpEmbeddingClient, HttpEmbeddingConfig};
use rag_core::tag::cooccurrence::TagCooccurrenceDB;
use serde::Serialize;
use std::sync::Arc;

async fn open_cooccurrence_db(
    config: &ResolvedConfig,
) -> anyhow::Result<rag_storage_redb::RedbCooccurrenceDb> {
    std::fs::create_dir_all(&config.state_dir).context("creating state directory")?;
    let db_path = config.state_dir.join("tags.redb");
    rag_storage_redb::RedbCooccurrenceDb::new(&db_path)
        .await
        .context("opening cooccurrence database")
}

fn build_embedder(config: &ResolvedConfig) -> anyhow::Result<Arc<dyn EmbeddingClient>> {
    Ok(Arc::new(
        HttpEmbeddingClient::new(HttpEmbeddingConfig {
            base_url: config.engine.api_url.clone().unwrap_or_default(),
            api_key: config.engine.api_key.clone().unwrap_or_default(),
            model: config
                .engine
                .whitelist_embedding_model
                .first()
                .cloned()
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            dimension: config.engine.vectordb_dimension,
            ..Default::default()
        })
        .context("constructing embedding client")?,
    ))
}

/// `rag-diary tag expand <seeds...>`: expand a seed tag set via the
/// cooccurrence graph.
pub async fn expand(
    seeds: Vec<String>,
    config: &ResolvedConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let db = open_cooccurrence_db(config).await?;
    let expanded = rag_core::tag::search::expand_tags(&db, &seeds, &config.engine).await?;

    let result = ExpandResult {
        seeds,
        candidates: expanded
            .into_iter()
            .map(|e| ExpandedTagView {
                tag: e.tag,
                weight: e.weight,
                source_count: e.source_count,
                avg_weight: e.avg_weight,
            })
            .collect(),
    };
    format.print(&result)
}

/// `rag-diary tag stats`: report the cooccurrence graph's size.
pub async fn stats(config: &ResolvedConfig, format: OutputFormat) -> anyhow::Result<()> {
    let db = open_cooccurrence_db(config).await?;
    let stats = db.stats().await?;
    let result = StatsResult {
        groups: stats.groups,
        pairs: stats.pairs,
        unique_tags: stats.unique_tags,
    };
    format.print(&result)
}

/// `rag-diary tag similar <query>`: embed `query` and find the `k` nearest
/// tags by cosine similarity.
///
/// This spins up a throwaway [`rag_core::tag::TagVectorManager`] seeded from
/// nothing: a real deployment keeps one running continuously via `ingest`'s
/// long-lived process, so here we only go as far as demonstrating the
/// `similar_tags` dispatch path against a freshly embedded query vector
/// sitting in an otherwise-empty index. Since no tags were ever registered
/// in this short-lived manager, this command mainly exists to exercise the
/// embedding round-trip; production similarity search reuses the manager
/// spawned by `ingest`.
pub async fn similar(
    query: String,
    k: usize,
    config: &ResolvedConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let embedder = build_embedder(config)?;
    let vectors = embedder.embed(&[query.clone()]).await.context("embedding query")?;
    let Some(query_vec) = vectors.into_iter().next() else {
        anyhow::bail!("embedding provider returned no vector for the query");
    };

    let db = open_cooccurrence_db(config).await?;
    let manager = rag_core::tag::TagVectorManager::new(config.engine.clone(), Arc::new(db), embedder);
    let handle = manager.spawn();
    let hits = handle.similar_tags(query_vec, k).await?;
    handle.shutdown().await;

    let result = SimilarResult {
        query,
        hits: hits
            .into_iter()
            .map(|h| SimilarTagView { tag: h.tag, score: h.score, frequency: h.frequency })
            .collect(),
    };
    format.print(&result)
}

#[derive(Debug, Serialize)]
struct ExpandedTagView {
    tag: String,
    weight: u32,
    source_count: usize,
    avg_weight: f32,
}

#[derive(Debug, Serialize)]
struct ExpandResult {
    seeds: Vec<String>,
    candidates: Vec<ExpandedTagView>,
}

impl Output for ExpandResult {
    fn write_human<W: std::io::Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "expanded from {:?}:", self.seeds)?;
        for c in &self.candidates {
            writeln!(writer, "  {} (weight {}, {} source(s))", c.tag, c.weight, c.source_count)?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct StatsResult {
    groups: usize,
    pairs: usize,
    unique_tags: usize,
}

impl Output for StatsResult {
    fn write_human<W: std::io::Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(
            writer,
            "groups: {}, pairs: {}, unique tags: {}",
            self.groups, self.pairs, self.unique_tags
        )?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SimilarTagView {
    tag: String,
    score: f32,
    frequency: u32,
}

#[derive(Debug, Serialize)]
struct SimilarResult {
    query: String,
    hits: Vec<SimilarTagView>,
}

impl Output for SimilarResult {
    fn write_human<W: std::io::Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "tags similar to {:?}:", self.query)?;
        for h in &self.hits {
            writeln!(writer, "  {} (score {:.3}, frequency {})", h.tag, h.score, h.frequency)?;
        }
        Ok(())
    }
}
