//! Global tag index: extraction, the per-file diff pipeline, the tag
//! cooccurrence graph contract, and tag search/expansion.

pub mod cooccurrence;
mod diff;
pub mod extraction;
pub mod manager;
pub mod search;
#[cfg(feature = "watch")]
pub mod watcher;

use std::collections::BTreeSet;

pub use cooccurrence::{CooccurrenceStats, InMemoryCooccurrenceDb, TagCooccurrenceDB};
pub use manager::{TagManagerHandle, TagVectorManager};
pub use search::{ExpandedTag, SimilarTag};

/// One entry in the global tag table.
///
/// Invariants: `frequency == Σ over files whose tag-set contains this tag`;
/// `diaries == ∪ of those files' diary names`. When `frequency` drops to 0
/// the entry is removed and its label soft-deleted from the tag index.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalTag {
    /// The tag string itself.
    pub tag_text: String,
    /// Embedding vector, absent until vectorization runs.
    pub vector: Option<Vec<f32>>,
    /// Number of registry entries whose tag set contains this tag.
    pub frequency: u32,
    /// Diary names that currently have at least one file carrying this tag.
    ///
    /// Decremented only on tag removal from a file, never re-derived from
    /// the full registry on every mutation. See `DESIGN.md` for the
    /// committed-to semantics when multiple files in one diary share a tag.
    pub diaries: BTreeSet<String>,
}

impl GlobalTag {
    /// A brand-new tag entry observed for the first time in `diary`.
    #[must_use]
    pub fn new_observed(tag_text: impl Into<String>, diary: impl Into<String>) -> Self {
        let mut diaries = BTreeSet::new();
        diaries.insert(diary.into());
        Self {
            tag_text: tag_text.into(),
            vector: None,
            frequency: 1,
            diaries,
        }
    }
}

/// `FileRegistry` entry: the canonical record of what tag-set a file
/// contributed last time it was scanned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRegistryEntry {
    /// Content digest of the file, used to short-circuit unchanged files.
    pub hash: String,
    /// Diary the file belongs to (its parent directory name).
    pub diary: String,
    /// Tag set the file contributed.
    pub tags: BTreeSet<String>,
}
