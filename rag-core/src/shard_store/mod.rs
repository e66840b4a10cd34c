//! Deterministic-hash sharded persistence for the global tag vector table.
//!
//! Vectors are partitioned `shard_index = stable_hash(tag) mod shard_count`
//! where `shard_count = ceil(vectorized_count / SHARD_SIZE)`. Every artifact
//! is written via temp file + atomic rename, the same pattern used by
//! [`crate::vector_index::persistence`].

mod artifacts;

use crate::error::{Error, Result};
use crate::tag::{FileRegistryEntry, GlobalTag};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

pub use artifacts::{
    FileRegistryFile, GlobalTagsMeta, LabelMap, Shard, TagMetaEntry, FILE_REGISTRY_FILENAME,
    META_FILENAME, LABEL_MAP_FILENAME,
};

/// Stable (non-randomized) hash of a tag string, used for shard placement.
/// `std`'s default hasher is randomized per-process, so we use a fixed
/// FNV-1a implementation to keep shard assignment deterministic across
/// runs and machines.
#[must_use]
pub fn stable_hash(tag: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = FNV_OFFSET;
    for byte in tag.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Number of shards needed to hold `vectorized_count` vectors at
/// `shard_size` vectors per shard.
#[must_use]
pub fn shard_count_for(vectorized_count: usize, shard_size: usize) -> usize {
    if vectorized_count == 0 {
        return 1;
    }
    vectorized_count.div_ceil(shard_size.max(1))
}

/// Which shard `tag` belongs to, given a snapshot `shard_count`.
///
/// There is a specific race to avoid here: recomputing
/// `shard_count` twice within one save. Callers must compute `shard_count`
/// once (via [`shard_count_for`]) against a single snapshot of the
/// vectorized-tag count and pass that same value to every
/// `shard_index_for` call within that save.
#[must_use]
pub fn shard_index_for(tag: &str, shard_count: usize) -> usize {
    (stable_hash(tag) % shard_count.max(1) as u64) as usize
}

fn checksum_of(vectors: &HashMap<String, Vec<f32>>) -> Result<String> {
    let bytes = postcard::to_allocvec(vectors)
        .map_err(|e| Error::PersistenceFailed(format!("encoding shard: {e}")))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

async fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&tmp_path, &bytes).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Persists the global tag table as a snapshot of sharded vector files plus
/// metadata, label map, and file registry.
pub struct ShardedVectorStore {
    dir: std::path::PathBuf,
    shard_size: usize,
}

impl ShardedVectorStore {
    /// A store rooted at `dir`, sharding at `shard_size` vectors per file.
    #[must_use]
    pub fn new(dir: impl Into<std::path::PathBuf>, shard_size: usize) -> Self {
        Self {
            dir: dir.into(),
            shard_size: shard_size.max(1),
        }
    }

    /// Write every artifact: `GlobalTags_meta.json`, one
    /// `GlobalTags_vectors_<i>.json` per shard, `GlobalTags_label_map.json`,
    /// and `FileRegistry.json`. The shard count is computed once against
    /// this call's vectorized-tag count and held fixed for every shard
    /// written during the call.
    ///
    /// # Errors
    /// Returns [`Error::PersistenceFailed`] or an I/O error on any write
    /// failure; no partial artifact set is left half-written thanks to the
    /// temp+rename pattern, but a failure partway through leaves earlier
    /// artifacts from this call already durable.
    pub async fn save(
        &self,
        tags: &HashMap<String, GlobalTag>,
        label_map: &LabelMap,
        registry: &HashMap<String, FileRegistryEntry>,
    ) -> Result<()> {
        let vectorized: Vec<(&str, &[f32])> = tags
            .iter()
            .filter_map(|(tag, entry)| entry.vector.as_deref().map(|v| (tag.as_str(), v)))
            .collect();
        let shard_count = shard_count_for(vectorized.len(), self.shard_size);

        let mut shard_buckets: Vec<HashMap<String, Vec<f32>>> =
            vec![HashMap::new(); shard_count];
        for (tag, vector) in &vectorized {
            let idx = shard_index_for(tag, shard_count);
            shard_buckets[idx].insert((*tag).to_string(), vector.to_vec());
        }

        for (idx, bucket) in shard_buckets.into_iter().enumerate() {
            let checksum = checksum_of(&bucket)?;
            let shard = Shard {
                version: crate::constants::ARTIFACT_VERSION.to_string(),
                checksum,
                vectors: bucket,
            };
            let path = self.dir.join(format!("GlobalTags_vectors_{idx}.json"));
            write_json_atomic(&path, &shard).await?;
        }

        let meta = GlobalTagsMeta::from_tags(tags);
        write_json_atomic(&self.dir.join(META_FILENAME), &meta).await?;
        write_json_atomic(&self.dir.join(LABEL_MAP_FILENAME), label_map).await?;

        let registry_file = FileRegistryFile::from_registry(registry);
        write_json_atomic(&self.dir.join(FILE_REGISTRY_FILENAME), &registry_file).await?;

        Ok(())
    }

    /// Load the persisted global tag table. Loading is tolerant: a missing
    /// shard degrades that shard's tags to "has no vector" with a warning; a
    /// checksum mismatch does the same rather than failing the whole load.
    ///
    /// # Errors
    /// Returns an I/O error if `GlobalTags_meta.json` itself is missing or
    /// unreadable (metadata is mandatory; shards are not).
    pub async fn load(
        &self,
    ) -> Result<(
        HashMap<String, GlobalTag>,
        LabelMap,
        HashMap<String, FileRegistryEntry>,
    )> {
        let meta_path = self.dir.join(META_FILENAME);
        let meta_bytes = tokio::fs::read(&meta_path).await?;
        let meta: GlobalTagsMeta = serde_json::from_slice(&meta_bytes)?;

        let mut tags: HashMap<String, GlobalTag> = meta
            .tags
            .iter()
            .map(|(tag, entry)| {
                let diaries: BTreeSet<String> = entry.diaries.iter().cloned().collect();
                (
                    tag.clone(),
                    GlobalTag {
                        tag_text: tag.clone(),
                        vector: None,
                        frequency: entry.frequency,
                        diaries,
                    },
                )
            })
            .collect();

        let shard_count = shard_count_for(meta.vectorized_tags, self.shard_size);
        for idx in 0..shard_count {
            let path = self.dir.join(format!("GlobalTags_vectors_{idx}.json"));
            let Ok(bytes) = tokio::fs::read(&path).await else {
                tracing::warn!(shard = idx, "missing vector shard, degraded to no-vector");
                continue;
            };
            let Ok(shard) = serde_json::from_slice::<Shard>(&bytes) else {
                tracing::warn!(shard = idx, "corrupt vector shard, degraded to no-vector");
                continue;
            };
            if checksum_of(&shard.vectors).ok().as_deref() != Some(shard.checksum.as_str()) {
                tracing::warn!(shard = idx, "checksum mismatch, degraded to no-vector");
                continue;
            }
            for (tag, vector) in shard.vectors {
                if let Some(entry) = tags.get_mut(&tag) {
                    entry.vector = Some(vector);
                }
            }
        }

        let label_map_path = self.dir.join(LABEL_MAP_FILENAME);
        let label_map = match tokio::fs::read(&label_map_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => LabelMap::default(),
        };

        let registry_path = self.dir.join(FILE_REGISTRY_FILENAME);
        let registry = match tokio::fs::read(&registry_path).await {
            Ok(bytes) => {
                let file: FileRegistryFile = serde_json::from_slice(&bytes)?;
                file.into_registry()
            }
            Err(_) => HashMap::new(),
        };

        Ok((tags, label_map, registry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn global_tag(vector: Option<Vec<f32>>) -> GlobalTag {
        GlobalTag {
            tag_text: "cat".to_string(),
            vector,
            frequency: 2,
            diaries: BTreeSet::from(["A".to_string()]),
        }
    }

    #[test]
    fn shard_index_is_deterministic_across_calls() {
        let a = shard_index_for("cat", 4);
        let b = shard_index_for("cat", 4);
        assert_eq!(a, b);
    }

    #[test]
    fn shard_count_rounds_up() {
        assert_eq!(shard_count_for(2001, 2000), 2);
        assert_eq!(shard_count_for(2000, 2000), 1);
        assert_eq!(shard_count_for(0, 2000), 1);
    }

    #[tokio::test]
    async fn save_then_load_roundtrips_vectors_and_registry() {
        let dir = tempdir().unwrap();
        let store = ShardedVectorStore::new(dir.path(), 10);

        let mut tags = HashMap::new();
        tags.insert("cat".to_string(), global_tag(Some(vec![1.0, 0.0])));

        let mut registry = HashMap::new();
        registry.insert(
            "A/a.md".to_string(),
            FileRegistryEntry {
                hash: "abc".to_string(),
                diary: "A".to_string(),
                tags: BTreeSet::from(["cat".to_string()]),
            },
        );

        let label_map = LabelMap {
            tag_to_label: vec![("cat".to_string(), 0)],
            label_to_tag: vec![(0, "cat".to_string())],
        };

        store.save(&tags, &label_map, &registry).await.unwrap();
        let (loaded_tags, loaded_map, loaded_registry) = store.load().await.unwrap();

        assert_eq!(loaded_tags["cat"].vector, Some(vec![1.0, 0.0]));
        assert_eq!(loaded_map.tag_to_label, vec![("cat".to_string(), 0)]);
        assert!(loaded_registry.contains_key("A/a.md"));
    }

    #[tokio::test]
    async fn missing_shard_degrades_tag_to_no_vector() {
        let dir = tempdir().unwrap();
        let store = ShardedVectorStore::new(dir.path(), 10);

        let mut tags = HashMap::new();
        tags.insert("cat".to_string(), global_tag(None));
        let registry = HashMap::new();
        let label_map = LabelMap::default();

        store.save(&tags, &label_map, &registry).await.unwrap();
        let (loaded_tags, _, _) = store.load().await.unwrap();
        assert!(loaded_tags["cat"].vector.is_none());
    }
}
