//! `ingest`: walk a diary root, feed every file into the tag subsystem.
//!
//! Chunking (turning a file's body into embedded, searchable chunks) is
//! handled by whatever upstream pipeline produces diary content; this
//! command only builds the tag side: extraction, cooccurrence, and tag
//! vectorization, the same three responsibilities `TagVectorManager` owns.

use crate::config::ResolvedConfig;
use crate::errors::{format_help, helpers, EnhancedError};
use crate::output::{Output, OutputFormat};
use anyhow::Context;
use rag_core::embedding::HttpEmbeddingClient;
use rag_core::tag::extraction::is_ignored_folder;
use rag_core::tag::TagVectorManager;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// `rag-diary ingest <root>`: recursively scan `root`, treating each
/// top-level subdirectory as a diary name, and feed every file's content
/// into the tag manager.
pub async fn run(
    root: &Path,
    config: &ResolvedConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let embedder = Arc::new(
        HttpEmbeddingClient::new(rag_core::embedding::HttpEmbeddingConfig {
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
        .context_with_help(&format_help(helpers::EMBEDDING_UNAVAILABLE))?,
    );

    let db_path = config.state_dir.join("tags.redb");
    std::fs::create_dir_all(&config.state_dir).context("creating state directory")?;
    let cooccurrence = Arc::new(
        rag_storage_redb::RedbCooccurrenceDb::new(&db_path)
            .await
            .context_with_help(&format_help(helpers::STORAGE_ERROR))?,
    );

    let manager = TagVectorManager::new(config.engine.clone(), cooccurrence, embedder);
    let handle = manager.spawn();

    let mut files = Vec::new();
    collect_files(root, &mut files)?;

    let mut files_seen = 0usize;
    for entry in files {
        let relative = entry.strip_prefix(root).unwrap_or(&entry);
        let Some(top_level) = relative.components().next() else {
            continue;
        };
        let diary = top_level.as_os_str().to_string_lossy().to_string();
        if is_ignored_folder(&diary, &config.engine) {
            continue;
        }

        let content = match std::fs::read_to_string(&entry) {
            Ok(content) => content,
            Err(_) => continue,
        };
        let rel_path = relative.to_string_lossy().to_string();
        handle.file_added(rel_path, diary, content).await?;
        files_seen += 1;
    }

    handle.persist_tick().await?;
    handle.shutdown().await;

    let summary = IngestSummary { root: root.display().to_string(), files_seen };
    format.print(&summary)
}

/// Recursively collect every regular file under `dir`, depth-first.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("reading directory {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&path, out)?;
        } else if file_type.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct IngestSummary {
    root: String,
    files_seen: usize,
}

impl Output for IngestSummary {
    fn write_human<W: std::io::Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "ingested {} file(s) from {}", self.files_seen, self.root)?;
        Ok(())
    }
}
