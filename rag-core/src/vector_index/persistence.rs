//! Crash-safe raw-vector persistence for [`super::VectorIndex`].
//!
//! Writes go to a `.tmp` sibling file followed by an atomic rename, matching
//! the shard-store durability pattern.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// One label/vector pair in a persisted snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Caller-assigned label.
    pub label: String,
    /// The L2-normalized vector stored under that label.
    pub vector: Vec<f32>,
}

/// Serializable form of a [`super::VectorIndex`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// Vector dimensionality.
    pub dimension: usize,
    /// Capacity the index had at save time.
    pub max_elements: usize,
    /// All label/vector pairs, in insertion-slot order.
    pub entries: Vec<SnapshotEntry>,
}

#[derive(Serialize, Deserialize)]
struct OnDiskSnapshot {
    checksum: String,
    snapshot: IndexSnapshot,
}

fn checksum_of(snapshot: &IndexSnapshot) -> Result<String> {
    let bytes = postcard::to_allocvec(snapshot)
        .map_err(|e| Error::PersistenceFailed(format!("encoding snapshot: {e}")))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

impl IndexSnapshot {
    /// Write this snapshot to `path` via a temp file + atomic rename, with a
    /// SHA-256 checksum recorded alongside the payload.
    ///
    /// # Errors
    /// Returns [`Error::PersistenceFailed`] on any I/O or encoding failure.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let checksum = checksum_of(self)?;
        let on_disk = OnDiskSnapshot {
            checksum,
            snapshot: self.clone(),
        };
        let bytes = postcard::to_allocvec(&on_disk)
            .map_err(|e| Error::PersistenceFailed(e.to_string()))?;

        let tmp_path = path.with_extension("tmp");
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::PersistenceFailed(e.to_string()))?;
        }
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| Error::PersistenceFailed(e.to_string()))?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| Error::PersistenceFailed(e.to_string()))?;
        Ok(())
    }

    /// Load a snapshot previously written by [`IndexSnapshot::save`],
    /// validating its checksum.
    ///
    /// # Errors
    /// Returns [`Error::IndexCorrupt`] if the checksum does not match, or an
    /// I/O error if the file cannot be read.
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let on_disk: OnDiskSnapshot = postcard::from_bytes(&bytes)
            .map_err(|e| Error::IndexCorrupt(format!("undecodable snapshot: {e}")))?;
        let expected = checksum_of(&on_disk.snapshot)?;
        if expected != on_disk.checksum {
            return Err(Error::IndexCorrupt(format!(
                "checksum mismatch for {}",
                path.display()
            )));
        }
        Ok(on_disk.snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shard.bin");
        let snapshot = IndexSnapshot {
            dimension: 2,
            max_elements: 16,
            entries: vec![SnapshotEntry {
                label: "a".to_string(),
                vector: vec![1.0, 0.0],
            }],
        };
        snapshot.save(&path).await.unwrap();
        let loaded = IndexSnapshot::load(&path).await.unwrap();
        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.entries[0].label, "a");
    }

    #[tokio::test]
    async fn corrupted_checksum_is_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shard.bin");
        let snapshot = IndexSnapshot {
            dimension: 2,
            max_elements: 16,
            entries: vec![],
        };
        snapshot.save(&path).await.unwrap();

        let mut bytes = tokio::fs::read(&path).await.unwrap();
        if let Some(last) = bytes.last_mut() {
            *last ^= 0xFF;
        }
        tokio::fs::write(&path, bytes).await.unwrap();

        let result = IndexSnapshot::load(&path).await;
        assert!(matches!(result, Err(Error::IndexCorrupt(_)) | Err(Error::PersistenceFailed(_))));
    }
}
