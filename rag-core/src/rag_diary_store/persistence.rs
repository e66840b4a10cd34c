//! Crash-safe persistence for a [`super::PerDiaryIndex`]: the ANN index in
//! `<diary>.bin`, the chunk table and name vector in a sibling
//! `<diary>.chunks.json`. Loading is tolerant: a missing or corrupt sibling
//! degrades to an empty table with a warning rather than failing the load.

use super::PerDiaryIndex;
use crate::error::Result;
use crate::types::Chunk;
use crate::vector_index::{IndexSnapshot, VectorIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Default)]
struct ChunkTableFile {
    chunks: HashMap<String, Chunk>,
    name_vector: Option<Vec<f32>>,
}

/// Reads and writes one diary's `<diary>.bin` + `<diary>.chunks.json` pair.
pub struct DiaryStorePersistence {
    dir: PathBuf,
}

impl DiaryStorePersistence {
    /// A persistence handle rooted at `dir`, where diary artifacts live.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn index_path(&self, diary: &str) -> PathBuf {
        self.dir.join(format!("{diary}.bin"))
    }

    fn chunk_table_path(&self, diary: &str) -> PathBuf {
        self.dir.join(format!("{diary}.chunks.json"))
    }

    /// Persist `store`'s index and chunk table via temp+rename.
    ///
    /// # Errors
    /// Returns [`crate::error::Error::PersistenceFailed`] or an I/O error on
    /// write failure.
    pub async fn save(&self, store: &PerDiaryIndex) -> Result<()> {
        let index_path = self.index_path(&store.diary);
        store.index.snapshot().save(&index_path).await?;

        let table = ChunkTableFile {
            chunks: store.chunks.clone(),
            name_vector: store.name_vector.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&table)?;
        let chunk_path = self.chunk_table_path(&store.diary);
        let tmp_path = chunk_path.with_extension("json.tmp");
        if let Some(parent) = chunk_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &chunk_path).await?;
        Ok(())
    }

    /// Load a diary's persisted state. A missing or unreadable `<diary>.bin`
    /// degrades to an empty index of `(dimension, max_elements)`; a missing
    /// or unreadable chunk table degrades to an empty table.
    pub async fn load(&self, diary: &str, dimension: usize, max_elements: usize) -> PerDiaryIndex {
        let index_path = self.index_path(diary);
        let index = match IndexSnapshot::load(&index_path).await {
            Ok(snapshot) => VectorIndex::from_snapshot(snapshot),
            Err(error) => {
                tracing::warn!(diary, %error, "diary index missing or corrupt, starting empty");
                VectorIndex::new(dimension, max_elements)
            }
        };

        let chunk_path = self.chunk_table_path(diary);
        let table = match tokio::fs::read(&chunk_path).await {
            Ok(bytes) => serde_json::from_slice::<ChunkTableFile>(&bytes).unwrap_or_default(),
            Err(error) => {
                tracing::warn!(diary, %error, "chunk table missing or corrupt, starting empty");
                ChunkTableFile::default()
            }
        };

        PerDiaryIndex {
            diary: diary.to_string(),
            index,
            chunks: table.chunks,
            name_vector: table.name_vector,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn save_then_load_roundtrips_chunks_and_name_vector() {
        let dir = tempdir().unwrap();
        let persistence = DiaryStorePersistence::new(dir.path());

        let mut store = PerDiaryIndex::new("A", 2, 16);
        store
            .upsert_chunk(Chunk::new("1", "hello", vec![1.0, 0.0]))
            .unwrap();
        store.set_name_vector(vec![0.5, 0.5]);

        persistence.save(&store).await.unwrap();
        let loaded = persistence.load("A", 2, 16).await;

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get_name_vector(), Some([0.5, 0.5].as_slice()));
    }

    #[tokio::test]
    async fn missing_files_degrade_to_empty_store() {
        let dir = tempdir().unwrap();
        let persistence = DiaryStorePersistence::new(dir.path());
        let loaded = persistence.load("ghost", 2, 16).await;
        assert!(loaded.is_empty());
        assert!(loaded.get_name_vector().is_none());
    }
}
