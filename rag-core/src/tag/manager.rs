//! `TagVectorManager`: an actor serializing all mutation of the global tag
//! table, file registry, and cooccurrence graph behind a single mailbox.
//!
//! Structured as a single command channel: the manager is an actor whose
//! mailbox serializes
//! `{Init, FileAdded, FileChanged, FileRemoved, PersistTick, ShutdownTick}`
//! messages through an owned loop rather than per-call locking, since tag
//! bookkeeping mutation must be strictly serialized, not merely thread-safe.

use super::cooccurrence::TagCooccurrenceDB;
use super::search::{self, ExpandedTag, SimilarTag};
use super::{diff, FileRegistryEntry, GlobalTag};
use crate::config::EngineConfig;
use crate::embedding::EmbeddingClient;
use crate::error::{Error, Result};
use crate::vector_index::VectorIndex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// One command accepted by the manager's mailbox.
pub enum TagManagerMessage {
    /// A file was created (or first seen at startup scan).
    FileAdded {
        /// Path relative to the diary root.
        path: String,
        /// Parent diary name.
        diary: String,
        /// Full file content, already read off disk by the caller.
        content: String,
    },
    /// A file's content changed.
    FileChanged {
        /// Path relative to the diary root.
        path: String,
        /// Parent diary name.
        diary: String,
        /// Full file content, already read off disk by the caller.
        content: String,
    },
    /// A file was deleted.
    FileRemoved {
        /// Path relative to the diary root.
        path: String,
    },
    /// Run the batched index rebuild + debounced persist, if due.
    PersistTick,
    /// Drain remaining work and stop.
    Shutdown,
    /// `similar_tags` query.
    SimilarTags {
        /// Pre-embedded query vector.
        query: Vec<f32>,
        /// Neighbor count.
        k: usize,
        /// Reply channel.
        reply: oneshot::Sender<Vec<SimilarTag>>,
    },
    /// `expand_tags` query.
    ExpandTags {
        /// Seed tags.
        seeds: Vec<String>,
        /// Reply channel.
        reply: oneshot::Sender<Result<Vec<ExpandedTag>>>,
    },
}

/// A cloneable handle to a running [`TagVectorManager`] actor.
#[derive(Clone)]
pub struct TagManagerHandle {
    sender: mpsc::Sender<TagManagerMessage>,
}

impl TagManagerHandle {
    /// Notify the actor that a file was added.
    ///
    /// # Errors
    /// Returns [`Error::Cancelled`] if the actor has already shut down.
    pub async fn file_added(&self, path: String, diary: String, content: String) -> Result<()> {
        self.sender
            .send(TagManagerMessage::FileAdded {
                path,
                diary,
                content,
            })
            .await
            .map_err(|_| Error::Cancelled)
    }

    /// Notify the actor that a file changed.
    ///
    /// # Errors
    /// Returns [`Error::Cancelled`] if the actor has already shut down.
    pub async fn file_changed(&self, path: String, diary: String, content: String) -> Result<()> {
        self.sender
            .send(TagManagerMessage::FileChanged {
                path,
                diary,
                content,
            })
            .await
            .map_err(|_| Error::Cancelled)
    }

    /// Notify the actor that a file was removed.
    ///
    /// # Errors
    /// Returns [`Error::Cancelled`] if the actor has already shut down.
    pub async fn file_removed(&self, path: String) -> Result<()> {
        self.sender
            .send(TagManagerMessage::FileRemoved { path })
            .await
            .map_err(|_| Error::Cancelled)
    }

    /// Trigger an out-of-band persist/rebuild tick (normally driven by the
    /// manager's own interval timer).
    ///
    /// # Errors
    /// Returns [`Error::Cancelled`] if the actor has already shut down.
    pub async fn persist_tick(&self) -> Result<()> {
        self.sender
            .send(TagManagerMessage::PersistTick)
            .await
            .map_err(|_| Error::Cancelled)
    }

    /// Query `k` tags most similar to `query`.
    ///
    /// # Errors
    /// Returns [`Error::Cancelled`] if the actor has already shut down.
    pub async fn similar_tags(&self, query: Vec<f32>, k: usize) -> Result<Vec<SimilarTag>> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(TagManagerMessage::SimilarTags { query, k, reply })
            .await
            .map_err(|_| Error::Cancelled)?;
        rx.await.map_err(|_| Error::Cancelled)
    }

    /// Expand a tag seed set via the cooccurrence graph.
    ///
    /// # Errors
    /// Returns [`Error::Cancelled`] if the actor has already shut down, or
    /// any error the expansion itself returns.
    pub async fn expand_tags(&self, seeds: Vec<String>) -> Result<Vec<ExpandedTag>> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(TagManagerMessage::ExpandTags { seeds, reply })
            .await
            .map_err(|_| Error::Cancelled)?;
        rx.await.map_err(|_| Error::Cancelled)?
    }

    /// Ask the actor to stop after draining its mailbox.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(TagManagerMessage::Shutdown).await;
    }
}

struct RebuildQueue {
    is_rebuilding: bool,
    pending: BTreeSet<String>,
    next: BTreeSet<String>,
}

impl RebuildQueue {
    fn new() -> Self {
        Self {
            is_rebuilding: false,
            pending: BTreeSet::new(),
            next: BTreeSet::new(),
        }
    }

    /// Enqueue a tag for (re)vectorization, honoring the double-buffer
    /// invariant: mutations during a rebuild land in `next`.
    fn enqueue(&mut self, tag: String) {
        if self.is_rebuilding {
            self.next.insert(tag);
        } else {
            self.pending.insert(tag);
        }
    }

    fn begin_batch(&mut self) -> BTreeSet<String> {
        self.is_rebuilding = true;
        std::mem::take(&mut self.pending)
    }

    fn complete_batch(&mut self) {
        self.is_rebuilding = false;
        self.pending = std::mem::take(&mut self.next);
    }
}

/// The global tag index: extraction, diffing, incremental vectorization,
/// and search, run as a serialized actor.
pub struct TagVectorManager {
    registry: HashMap<String, FileRegistryEntry>,
    tags: HashMap<String, GlobalTag>,
    index: VectorIndex,
    cooccurrence: Arc<dyn TagCooccurrenceDB>,
    embedder: Arc<dyn EmbeddingClient>,
    config: EngineConfig,
    rebuild_queue: RebuildQueue,
    dirty: bool,
}

impl TagVectorManager {
    /// Construct a manager with empty state. Loading persisted state is the
    /// caller's responsibility (via [`crate::shard_store`]), keeping
    /// initialization non-blocking at the composition root rather than
    /// inside this constructor.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        cooccurrence: Arc<dyn TagCooccurrenceDB>,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Self {
        let dimension = config.vectordb_dimension.unwrap_or(1536);
        Self {
            registry: HashMap::new(),
            tags: HashMap::new(),
            index: VectorIndex::new(dimension, 1024),
            cooccurrence,
            embedder,
            config,
            rebuild_queue: RebuildQueue::new(),
            dirty: false,
        }
    }

    /// Spawn the actor loop, returning a handle. The loop runs until
    /// [`TagManagerHandle::shutdown`] is called or every handle is dropped.
    pub fn spawn(mut self) -> TagManagerHandle {
        let (tx, mut rx) = mpsc::channel(256);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    TagManagerMessage::FileAdded {
                        path,
                        diary,
                        content,
                    }
                    | TagManagerMessage::FileChanged {
                        path,
                        diary,
                        content,
                    } => {
                        if let Err(err) = self.handle_file_event(&path, &diary, &content).await {
                            warn!(path, error = %err, "tag diff failed");
                        }
                    }
                    TagManagerMessage::FileRemoved { path } => {
                        if let Err(err) = self.handle_file_removed(&path).await {
                            warn!(path, error = %err, "tag removal failed");
                        }
                    }
                    TagManagerMessage::PersistTick => {
                        if let Err(err) = self.run_persist_tick().await {
                            warn!(error = %err, "persist tick failed");
                        }
                    }
                    TagManagerMessage::SimilarTags { query, k, reply } => {
                        let hits = search::similar_tags_by_vector(&self.index, &self.tags, &query, k);
                        let _ = reply.send(hits);
                    }
                    TagManagerMessage::ExpandTags { seeds, reply } => {
                        let result =
                            search::expand_tags(self.cooccurrence.as_ref(), &seeds, &self.config)
                                .await;
                        let _ = reply.send(result);
                    }
                    TagManagerMessage::Shutdown => break,
                }
            }
            info!("tag manager actor stopped");
        });
        TagManagerHandle { sender: tx }
    }

    async fn handle_file_event(&mut self, path: &str, diary: &str, content: &str) -> Result<()> {
        let current_tags = super::extraction::extract_tags(content, &self.config);
        let current_hash = diff::content_hash(content);

        let outcome = diff::apply_file_event(
            &mut self.registry,
            &mut self.tags,
            self.cooccurrence.as_ref(),
            path,
            diary,
            current_tags,
            current_hash,
        )
        .await?;

        if outcome.unchanged {
            return Ok(());
        }

        for tag in &outcome.removed {
            if !self.tags.contains_key(tag) {
                self.index.remove(tag);
            }
        }
        for tag in &outcome.added {
            self.rebuild_queue.enqueue(tag.clone());
        }
        if !outcome.added.is_empty() || !outcome.removed.is_empty() {
            self.dirty = true;
        }
        Ok(())
    }

    async fn handle_file_removed(&mut self, path: &str) -> Result<()> {
        let outcome = diff::apply_file_removed(
            &mut self.registry,
            &mut self.tags,
            self.cooccurrence.as_ref(),
            path,
        )
        .await?;
        for tag in &outcome.removed {
            if !self.tags.contains_key(tag) {
                self.index.remove(tag);
            }
        }
        if !outcome.removed.is_empty() {
            self.dirty = true;
        }
        Ok(())
    }

    /// Vectorize any pending tags and fold them into the ANN index via
    /// `add_points`-style incremental insert, then persist if dirty.
    ///
    /// Prefers incremental update over full rebuild; the index itself grows
    /// via `VectorIndex::upsert`'s internal resize policy.
    async fn run_persist_tick(&mut self) -> Result<()> {
        let batch = self.rebuild_queue.begin_batch();
        if batch.is_empty() {
            self.rebuild_queue.complete_batch();
            return Ok(());
        }

        let texts: Vec<String> = batch.iter().cloned().collect();
        let vectors = self.embedder.embed(&texts).await?;

        for (tag, vector) in texts.into_iter().zip(vectors) {
            self.index.upsert(tag.clone(), vector.clone())?;
            if let Some(entry) = self.tags.get_mut(&tag) {
                entry.vector = Some(vector);
            }
        }

        self.rebuild_queue.complete_batch();
        self.dirty = false;
        debug!(count = batch.len(), "vectorized pending tags");
        Ok(())
    }

    /// Access the manager's state directly (test/inspection use only).
    #[cfg(test)]
    fn tags_snapshot(&self) -> &HashMap<String, GlobalTag> {
        &self.tags
    }
}

/// Run the startup consistency check: if `pairs` is empty while `files` is
/// not, or file counts diverge by more than 10% from the file registry, a
/// resync is warranted.
///
/// # Errors
/// Propagates errors from the `cooccurrence` backend.
pub async fn needs_cooccurrence_resync(
    cooccurrence: &dyn TagCooccurrenceDB,
    registry_len: usize,
) -> Result<bool> {
    let stats = cooccurrence.stats().await?;
    if stats.groups > 0 && stats.pairs == 0 && registry_len > 1 {
        return Ok(true);
    }
    let file_count = cooccurrence.file_count().await?;
    if registry_len == 0 {
        return Ok(false);
    }
    let diff = registry_len.abs_diff(file_count);
    Ok((diff as f64 / registry_len as f64) > 0.10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::cooccurrence::InMemoryCooccurrenceDb;
    use async_trait::async_trait;

    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingClient for StubEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
        }

        fn dimension(&self) -> Option<usize> {
            Some(3)
        }
    }

    fn manager() -> TagVectorManager {
        let mut config = EngineConfig::default();
        config.vectordb_dimension = Some(3);
        TagVectorManager::new(
            config,
            Arc::new(InMemoryCooccurrenceDb::new()),
            Arc::new(StubEmbedder),
        )
    }

    #[tokio::test]
    async fn file_added_then_persist_tick_vectorizes_new_tags() {
        let mut manager = manager();
        manager
            .handle_file_event("A/a.md", "A", "hello\nTag: cat, dog")
            .await
            .unwrap();
        assert_eq!(manager.tags_snapshot()["cat"].frequency, 1);
        assert!(manager.tags_snapshot()["cat"].vector.is_none());

        manager.run_persist_tick().await.unwrap();
        assert!(manager.tags_snapshot()["cat"].vector.is_some());
    }

    #[tokio::test]
    async fn rebuild_queue_buffers_into_next_during_batch() {
        let mut queue = RebuildQueue::new();
        queue.enqueue("a".to_string());
        let batch = queue.begin_batch();
        assert_eq!(batch, BTreeSet::from(["a".to_string()]));

        queue.enqueue("b".to_string());
        assert!(queue.pending.is_empty());
        assert_eq!(queue.next, BTreeSet::from(["b".to_string()]));

        queue.complete_batch();
        assert_eq!(queue.pending, BTreeSet::from(["b".to_string()]));
        assert!(!queue.is_rebuilding);
    }

    #[tokio::test]
    async fn resync_triggered_when_pairs_empty_but_groups_present() {
        let db = InMemoryCooccurrenceDb::new();
        db.record_tag_group(
            "a.md",
            "A",
            &BTreeSet::from(["solo".to_string()]),
        )
        .await
        .unwrap();
        assert!(needs_cooccurrence_resync(&db, 5).await.unwrap());
    }
}
