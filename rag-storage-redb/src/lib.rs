//! # Rag Storage Redb
//!
//! A durable [`TagCooccurrenceDB`] backed by an embedded `redb` database,
//! used in place of [`rag_core::tag::cooccurrence::InMemoryCooccurrenceDb`]
//! when the tag manager needs its cooccurrence graph to survive a restart.
//!
//! ## Example
//!
//! ```no_run
//! use rag_storage_redb::RedbCooccurrenceDb;
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let db = RedbCooccurrenceDb::new(Path::new("./tags.redb")).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use rag_core::error::{Error, Result};
use rag_core::tag::cooccurrence::{canonical_pair, CooccurrenceStats, TagCooccurrenceDB};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub(crate) const FILES_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("cooccurrence_files");
pub(crate) const PAIRS_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("cooccurrence_pairs");

const DB_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

async fn with_db_timeout<T, F>(operation: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(DB_OPERATION_TIMEOUT, tokio::task::spawn_blocking(operation)).await
    {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(Error::Storage(format!("task join error: {join_err}"))),
        Err(_) => Err(Error::Storage(format!(
            "database operation timed out after {DB_OPERATION_TIMEOUT:?}"
        ))),
    }
}

/// One tracked file's tag set, as stored in [`FILES_TABLE`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileRow {
    diary: String,
    tags: BTreeSet<String>,
}

fn pair_key(a: &str, b: &str) -> String {
    let (lo, hi) = canonical_pair(a, b);
    format!("{lo}\u{1f}{hi}")
}

/// `redb`-backed [`TagCooccurrenceDB`]: one table of per-file tag sets, one
/// table of symmetric pair weights, both updated inside a single write
/// transaction so a crash mid-update never leaves a pair count adjusted
/// without its corresponding file row (or vice versa).
pub struct RedbCooccurrenceDb {
    db: Arc<Database>,
}

impl RedbCooccurrenceDb {
    /// Open (creating if absent) the `redb` database at `path`.
    ///
    /// # Errors
    /// Returns [`Error::Storage`] if the file cannot be created or opened,
    /// or if the operation exceeds its internal timeout.
    pub async fn new(path: &Path) -> Result<Self> {
        info!("opening cooccurrence redb database at {}", path.display());
        let path_buf = path.to_path_buf();
        let db = with_db_timeout(move || {
            let database = Database::create(&path_buf)
                .map_err(|e| Error::Storage(format!("failed to create redb database: {e}")))?;
            // Ensure both tables exist even if the database file is new.
            let write_txn = database
                .begin_write()
                .map_err(|e| Error::Storage(format!("failed to begin write transaction: {e}")))?;
            {
                write_txn
                    .open_table(FILES_TABLE)
                    .map_err(|e| Error::Storage(format!("failed to open files table: {e}")))?;
                write_txn
                    .open_table(PAIRS_TABLE)
                    .map_err(|e| Error::Storage(format!("failed to open pairs table: {e}")))?;
            }
            write_txn
                .commit()
                .map_err(|e| Error::Storage(format!("failed to commit transaction: {e}")))?;
            Ok(database)
        })
        .await?;

        Ok(Self { db: Arc::new(db) })
    }

    fn adjust_pairs_in_txn(
        write_txn: &redb::WriteTransaction,
        tags: &BTreeSet<String>,
        delta: i64,
    ) -> Result<()> {
        if tags.len() < 2 {
            return Ok(());
        }
        let mut table = write_txn
            .open_table(PAIRS_TABLE)
            .map_err(|e| Error::Storage(format!("failed to open pairs table: {e}")))?;
        let ordered: Vec<&String> = tags.iter().collect();
        for i in 0..ordered.len() {
            for j in (i + 1)..ordered.len() {
                let key = pair_key(ordered[i], ordered[j]);
                let current: u32 = match table
                    .get(key.as_str())
                    .map_err(|e| Error::Storage(format!("failed to read pair weight: {e}")))?
                {
                    Some(bytes) => postcard::from_bytes(bytes.value())
                        .map_err(|e| Error::Storage(format!("corrupt pair weight: {e}")))?,
                    None => 0,
                };
                let signed = i64::from(current) + delta;
                if signed <= 0 {
                    table
                        .remove(key.as_str())
                        .map_err(|e| Error::Storage(format!("failed to remove pair: {e}")))?;
                } else {
                    let encoded = postcard::to_allocvec(&(signed as u32))
                        .map_err(|e| Error::Storage(format!("failed to encode pair weight: {e}")))?;
                    table
                        .insert(key.as_str(), encoded.as_slice())
                        .map_err(|e| Error::Storage(format!("failed to write pair weight: {e}")))?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TagCooccurrenceDB for RedbCooccurrenceDb {
    async fn record_tag_group(
        &self,
        file_path: &str,
        diary: &str,
        tags: &BTreeSet<String>,
    ) -> Result<()> {
        let db = Arc::clone(&self.db);
        let file_path = file_path.to_string();
        let diary = diary.to_string();
        let tags = tags.clone();

        with_db_timeout(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Storage(format!("failed to begin write transaction: {e}")))?;

            let old_tags = {
                let table = write_txn
                    .open_table(FILES_TABLE)
                    .map_err(|e| Error::Storage(format!("failed to open files table: {e}")))?;
                match table
                    .get(file_path.as_str())
                    .map_err(|e| Error::Storage(format!("failed to read file row: {e}")))?
                {
                    Some(bytes) => {
                        let row: FileRow = postcard::from_bytes(bytes.value())
                            .map_err(|e| Error::Storage(format!("corrupt file row: {e}")))?;
                        Some(row.tags)
                    }
                    None => None,
                }
            };

            if let Some(old) = &old_tags {
                Self::adjust_pairs_in_txn(&write_txn, old, -1)?;
            }
            Self::adjust_pairs_in_txn(&write_txn, &tags, 1)?;

            {
                let mut table = write_txn
                    .open_table(FILES_TABLE)
                    .map_err(|e| Error::Storage(format!("failed to open files table: {e}")))?;
                let row = FileRow { diary: diary.clone(), tags: tags.clone() };
                let encoded = postcard::to_allocvec(&row)
                    .map_err(|e| Error::Storage(format!("failed to encode file row: {e}")))?;
                table
                    .insert(file_path.as_str(), encoded.as_slice())
                    .map_err(|e| Error::Storage(format!("failed to write file row: {e}")))?;
            }

            write_txn
                .commit()
                .map_err(|e| Error::Storage(format!("failed to commit transaction: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn remove_tag_group(&self, file_path: &str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let file_path = file_path.to_string();

        with_db_timeout(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Storage(format!("failed to begin write transaction: {e}")))?;

            let old_tags = {
                let mut table = write_txn
                    .open_table(FILES_TABLE)
                    .map_err(|e| Error::Storage(format!("failed to open files table: {e}")))?;
                match table
                    .remove(file_path.as_str())
                    .map_err(|e| Error::Storage(format!("failed to remove file row: {e}")))?
                {
                    Some(bytes) => {
                        let row: FileRow = postcard::from_bytes(bytes.value())
                            .map_err(|e| Error::Storage(format!("corrupt file row: {e}")))?;
                        Some(row.tags)
                    }
                    None => None,
                }
            };

            if let Some(old) = &old_tags {
                Self::adjust_pairs_in_txn(&write_txn, old, -1)?;
            }

            write_txn
                .commit()
                .map_err(|e| Error::Storage(format!("failed to commit transaction: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn pair_weight(&self, a: &str, b: &str) -> Result<u32> {
        let db = Arc::clone(&self.db);
        let key = pair_key(a, b);

        with_db_timeout(move || {
            let read_txn = db
                .begin_read()
                .map_err(|e| Error::Storage(format!("failed to begin read transaction: {e}")))?;
            let table = read_txn
                .open_table(PAIRS_TABLE)
                .map_err(|e| Error::Storage(format!("failed to open pairs table: {e}")))?;
            match table
                .get(key.as_str())
                .map_err(|e| Error::Storage(format!("failed to read pair weight: {e}")))?
            {
                Some(bytes) => {
                    let weight: u32 = postcard::from_bytes(bytes.value())
                        .map_err(|e| Error::Storage(format!("corrupt pair weight: {e}")))?;
                    Ok(weight)
                }
                None => Ok(0),
            }
        })
        .await
    }

    async fn pairs_for(&self, tag: &str) -> Result<Vec<(String, u32)>> {
        let db = Arc::clone(&self.db);
        let tag = tag.to_string();

        with_db_timeout(move || {
            let read_txn = db
                .begin_read()
                .map_err(|e| Error::Storage(format!("failed to begin read transaction: {e}")))?;
            let table = read_txn
                .open_table(PAIRS_TABLE)
                .map_err(|e| Error::Storage(format!("failed to open pairs table: {e}")))?;

            let mut result = Vec::new();
            let iter = table
                .iter()
                .map_err(|e| Error::Storage(format!("failed to iterate pairs: {e}")))?;
            for entry in iter {
                let (key_guard, value_guard) = entry
                    .map_err(|e| Error::Storage(format!("failed to read pair entry: {e}")))?;
                let key = key_guard.value();
                let Some((a, b)) = key.split_once('\u{1f}') else {
                    continue;
                };
                let other = if a == tag {
                    Some(b)
                } else if b == tag {
                    Some(a)
                } else {
                    None
                };
                if let Some(other) = other {
                    let weight: u32 = postcard::from_bytes(value_guard.value())
                        .map_err(|e| Error::Storage(format!("corrupt pair weight: {e}")))?;
                    result.push((other.to_string(), weight));
                }
            }
            Ok(result)
        })
        .await
    }

    async fn export_matrix(
        &self,
    ) -> Result<std::collections::BTreeMap<String, std::collections::BTreeMap<String, u32>>> {
        let db = Arc::clone(&self.db);

        with_db_timeout(move || {
            let read_txn = db
                .begin_read()
                .map_err(|e| Error::Storage(format!("failed to begin read transaction: {e}")))?;
            let table = read_txn
                .open_table(PAIRS_TABLE)
                .map_err(|e| Error::Storage(format!("failed to open pairs table: {e}")))?;

            let mut matrix: std::collections::BTreeMap<String, std::collections::BTreeMap<String, u32>> =
                std::collections::BTreeMap::new();
            let iter = table
                .iter()
                .map_err(|e| Error::Storage(format!("failed to iterate pairs: {e}")))?;
            for entry in iter {
                let (key_guard, value_guard) = entry
                    .map_err(|e| Error::Storage(format!("failed to read pair entry: {e}")))?;
                let key = key_guard.value();
                let Some((a, b)) = key.split_once('\u{1f}') else {
                    continue;
                };
                let weight: u32 = postcard::from_bytes(value_guard.value())
                    .map_err(|e| Error::Storage(format!("corrupt pair weight: {e}")))?;
                matrix.entry(a.to_string()).or_default().insert(b.to_string(), weight);
                matrix.entry(b.to_string()).or_default().insert(a.to_string(), weight);
            }
            Ok(matrix)
        })
        .await
    }

    async fn stats(&self) -> Result<CooccurrenceStats> {
        let db = Arc::clone(&self.db);

        with_db_timeout(move || {
            let read_txn = db
                .begin_read()
                .map_err(|e| Error::Storage(format!("failed to begin read transaction: {e}")))?;

            let files_table = read_txn
                .open_table(FILES_TABLE)
                .map_err(|e| Error::Storage(format!("failed to open files table: {e}")))?;
            let pairs_table = read_txn
                .open_table(PAIRS_TABLE)
                .map_err(|e| Error::Storage(format!("failed to open pairs table: {e}")))?;

            let groups = files_table
                .len()
                .map_err(|e| Error::Storage(format!("failed to count files: {e}")))?
                as usize;
            let pairs = pairs_table
                .len()
                .map_err(|e| Error::Storage(format!("failed to count pairs: {e}")))?
                as usize;

            let mut unique_tags = BTreeSet::new();
            let iter = files_table
                .iter()
                .map_err(|e| Error::Storage(format!("failed to iterate files: {e}")))?;
            for entry in iter {
                let (_, bytes_guard) = entry
                    .map_err(|e| Error::Storage(format!("failed to read file entry: {e}")))?;
                let row: FileRow = postcard::from_bytes(bytes_guard.value())
                    .map_err(|e| Error::Storage(format!("corrupt file row: {e}")))?;
                unique_tags.extend(row.tags);
            }

            Ok(CooccurrenceStats { groups, pairs, unique_tags: unique_tags.len() })
        })
        .await
    }

    async fn file_count(&self) -> Result<usize> {
        let db = Arc::clone(&self.db);
        with_db_timeout(move || {
            let read_txn = db
                .begin_read()
                .map_err(|e| Error::Storage(format!("failed to begin read transaction: {e}")))?;
            let table = read_txn
                .open_table(FILES_TABLE)
                .map_err(|e| Error::Storage(format!("failed to open files table: {e}")))?;
            let count = table
                .len()
                .map_err(|e| Error::Storage(format!("failed to count files: {e}")))?;
            Ok(count as usize)
        })
        .await
    }
}

impl std::fmt::Debug for RedbCooccurrenceDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbCooccurrenceDb").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn tags(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    async fn open_temp() -> (RedbCooccurrenceDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.redb");
        let db = RedbCooccurrenceDb::new(&path).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn recording_a_group_increments_pair_weights() {
        let (db, _dir) = open_temp().await;
        db.record_tag_group("a.md", "diary", &tags(&["cat", "dog"])).await.unwrap();
        assert_eq!(db.pair_weight("cat", "dog").await.unwrap(), 1);
        assert_eq!(db.pair_weight("dog", "cat").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn replacing_a_group_adjusts_delta_not_full_reset() {
        let (db, _dir) = open_temp().await;
        db.record_tag_group("a.md", "diary", &tags(&["cat", "dog"])).await.unwrap();
        db.record_tag_group("b.md", "diary", &tags(&["cat", "dog"])).await.unwrap();
        assert_eq!(db.pair_weight("cat", "dog").await.unwrap(), 2);

        db.record_tag_group("a.md", "diary", &tags(&["cat"])).await.unwrap();
        assert_eq!(db.pair_weight("cat", "dog").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn removing_a_group_zeroes_its_pairs() {
        let (db, _dir) = open_temp().await;
        db.record_tag_group("a.md", "diary", &tags(&["cat", "dog"])).await.unwrap();
        db.remove_tag_group("a.md").await.unwrap();
        assert_eq!(db.pair_weight("cat", "dog").await.unwrap(), 0);
        assert_eq!(db.file_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stats_reports_groups_pairs_and_unique_tags() {
        let (db, _dir) = open_temp().await;
        db.record_tag_group("a.md", "diary", &tags(&["cat", "dog", "bird"])).await.unwrap();
        let stats = db.stats().await.unwrap();
        assert_eq!(stats.groups, 1);
        assert_eq!(stats.pairs, 3);
        assert_eq!(stats.unique_tags, 3);
    }

    #[tokio::test]
    async fn export_matrix_is_symmetric() {
        let (db, _dir) = open_temp().await;
        db.record_tag_group("a.md", "diary", &tags(&["cat", "dog"])).await.unwrap();
        let matrix = db.export_matrix().await.unwrap();
        assert_eq!(matrix["cat"]["dog"], 1);
        assert_eq!(matrix["dog"]["cat"], 1);
    }

    #[tokio::test]
    async fn state_survives_reopening_the_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.redb");
        {
            let db = RedbCooccurrenceDb::new(&path).await.unwrap();
            db.record_tag_group("a.md", "diary", &tags(&["cat", "dog"])).await.unwrap();
        }
        let reopened = RedbCooccurrenceDb::new(&path).await.unwrap();
        assert_eq!(reopened.pair_weight("cat", "dog").await.unwrap(), 1);
    }
}
