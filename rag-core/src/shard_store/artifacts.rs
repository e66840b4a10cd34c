//! On-disk shapes for the sharded global tag table's artifacts.

use crate::tag::{FileRegistryEntry, GlobalTag};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

pub const META_FILENAME: &str = "GlobalTags_meta.json";
pub const LABEL_MAP_FILENAME: &str = "GlobalTags_label_map.json";
pub const FILE_REGISTRY_FILENAME: &str = "FileRegistry.json";

/// One vector shard: `GlobalTags_vectors_<i>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shard {
    pub version: String,
    pub checksum: String,
    pub vectors: HashMap<String, Vec<f32>>,
}

/// Per-tag metadata kept alongside (not inside) the sharded vectors, so a
/// tag's frequency and diary set are visible without touching any shard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagMetaEntry {
    pub has_vector: bool,
    pub frequency: u32,
    pub diaries: Vec<String>,
}

/// `GlobalTags_meta.json`: every known tag's metadata, plus the counts
/// needed to recompute `shard_count` on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalTagsMeta {
    pub version: String,
    pub total_tags: usize,
    pub vectorized_tags: usize,
    pub tags: HashMap<String, TagMetaEntry>,
}

impl GlobalTagsMeta {
    #[must_use]
    pub fn from_tags(tags: &HashMap<String, GlobalTag>) -> Self {
        let vectorized_tags = tags.values().filter(|t| t.vector.is_some()).count();
        let entries = tags
            .iter()
            .map(|(tag, entry)| {
                (
                    tag.clone(),
                    TagMetaEntry {
                        has_vector: entry.vector.is_some(),
                        frequency: entry.frequency,
                        diaries: entry.diaries.iter().cloned().collect(),
                    },
                )
            })
            .collect();
        Self {
            version: crate::constants::ARTIFACT_VERSION.to_string(),
            total_tags: tags.len(),
            vectorized_tags,
            tags: entries,
        }
    }
}

/// `GlobalTags_label_map.json`: the stable tag <-> ANN-label mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelMap {
    pub tag_to_label: Vec<(String, u64)>,
    pub label_to_tag: Vec<(u64, String)>,
}

/// `FileRegistry.json`: flattened form of the registry map for JSON
/// round-tripping (serde_json can't serialize a `HashMap` keyed by an
/// arbitrary string containing path separators as object keys reliably
/// across all JSON consumers, so we store it as an explicit entry list).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRegistryFile {
    pub entries: Vec<FileRegistryRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRegistryRecord {
    pub path: String,
    pub hash: String,
    pub diary: String,
    pub tags: BTreeSet<String>,
}

impl FileRegistryFile {
    #[must_use]
    pub fn from_registry(registry: &HashMap<String, FileRegistryEntry>) -> Self {
        let entries = registry
            .iter()
            .map(|(path, entry)| FileRegistryRecord {
                path: path.clone(),
                hash: entry.hash.clone(),
                diary: entry.diary.clone(),
                tags: entry.tags.clone(),
            })
            .collect();
        Self { entries }
    }

    #[must_use]
    pub fn into_registry(self) -> HashMap<String, FileRegistryEntry> {
        self.entries
            .into_iter()
            .map(|record| {
                (
                    record.path,
                    FileRegistryEntry {
                        hash: record.hash,
                        diary: record.diary,
                        tags: record.tags,
                    },
                )
            })
            .collect()
    }
}
