//! The `TagCooccurrenceDB` contract and an in-memory reference
//! implementation used by tests and as the manager's default backend when
//! no durable store is configured. The durable `redb`-backed
//! implementation lives in the `rag-storage-redb` crate, which depends on
//! this trait.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Canonically order a tag pair so `a < b`.
#[must_use]
pub fn canonical_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Aggregate counters for [`TagCooccurrenceDB::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CooccurrenceStats {
    /// Number of file rows tracked.
    pub groups: usize,
    /// Number of distinct pair rows with nonzero weight.
    pub pairs: usize,
    /// Number of distinct tags appearing in at least one row.
    pub unique_tags: usize,
}

/// Embedded relational store of `(file -> tag-set)` rows and symmetric pair
/// weights. All operations are O(|tags_in_file|^2) in tag count, independent
/// of total file count.
#[async_trait]
pub trait TagCooccurrenceDB: Send + Sync {
    /// Canonical upsert for `file_path`'s tag group. If a row already
    /// exists, weights are adjusted by the delta between the old and new
    /// tag sets (decrement pairs only in the old set, increment pairs only
    /// in the new set); the stored set is then replaced.
    ///
    /// # Errors
    /// Returns [`crate::Error::Storage`] or
    /// [`crate::Error::CooccurrenceInconsistent`] on a backing-store
    /// failure.
    async fn record_tag_group(
        &self,
        file_path: &str,
        diary: &str,
        tags: &BTreeSet<String>,
    ) -> Result<()>;

    /// Remove `file_path`'s row entirely, decrementing every pair weight of
    /// its previously stored tag set.
    ///
    /// # Errors
    /// Returns [`crate::Error::Storage`] on a backing-store failure.
    async fn remove_tag_group(&self, file_path: &str) -> Result<()>;

    /// Pairwise weight for an unordered tag pair, `0` if absent.
    async fn pair_weight(&self, a: &str, b: &str) -> Result<u32>;

    /// All pairs involving `tag`, as `(other_tag, weight)`.
    async fn pairs_for(&self, tag: &str) -> Result<Vec<(String, u32)>>;

    /// Export the full pair-weight matrix as `tag -> { related_tag -> weight }`
    /// for fast warm start, persisted as `TagCooccurrence_matrix.json`.
    async fn export_matrix(&self) -> Result<BTreeMap<String, BTreeMap<String, u32>>>;

    /// Total groups, pairs, and unique tags currently tracked.
    async fn stats(&self) -> Result<CooccurrenceStats>;

    /// Number of file rows currently tracked, used by the startup
    /// consistency check.
    async fn file_count(&self) -> Result<usize>;
}

/// In-memory `TagCooccurrenceDB`, used by tests and as a fallback backend.
#[derive(Debug, Default)]
pub struct InMemoryCooccurrenceDb {
    inner: parking_lot::Mutex<InMemoryState>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    files: HashMap<String, BTreeSet<String>>,
    pairs: BTreeMap<(String, String), u32>,
}

impl InMemoryCooccurrenceDb {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn adjust_pairs(state: &mut InMemoryState, tags: &BTreeSet<String>, delta: i64) {
        let ordered: Vec<&String> = tags.iter().collect();
        for i in 0..ordered.len() {
            for j in (i + 1)..ordered.len() {
                let pair = canonical_pair(ordered[i], ordered[j]);
                let entry = state.pairs.entry(pair.clone()).or_insert(0);
                let signed = i64::from(*entry) + delta;
                if signed <= 0 {
                    state.pairs.remove(&pair);
                } else {
                    *entry = signed as u32;
                }
            }
        }
    }
}

#[async_trait]
impl TagCooccurrenceDB for InMemoryCooccurrenceDb {
    async fn record_tag_group(
        &self,
        file_path: &str,
        _diary: &str,
        tags: &BTreeSet<String>,
    ) -> Result<()> {
        let mut state = self.inner.lock();
        if let Some(old) = state.files.remove(file_path) {
            Self::adjust_pairs(&mut state, &old, -1);
        }
        Self::adjust_pairs(&mut state, tags, 1);
        state.files.insert(file_path.to_string(), tags.clone());
        Ok(())
    }

    async fn remove_tag_group(&self, file_path: &str) -> Result<()> {
        let mut state = self.inner.lock();
        if let Some(old) = state.files.remove(file_path) {
            Self::adjust_pairs(&mut state, &old, -1);
        }
        Ok(())
    }

    async fn pair_weight(&self, a: &str, b: &str) -> Result<u32> {
        let state = self.inner.lock();
        let pair = canonical_pair(a, b);
        Ok(state.pairs.get(&pair).copied().unwrap_or(0))
    }

    async fn pairs_for(&self, tag: &str) -> Result<Vec<(String, u32)>> {
        let state = self.inner.lock();
        let mut result = Vec::new();
        for ((a, b), weight) in &state.pairs {
            if a == tag {
                result.push((b.clone(), *weight));
            } else if b == tag {
                result.push((a.clone(), *weight));
            }
        }
        Ok(result)
    }

    async fn export_matrix(&self) -> Result<BTreeMap<String, BTreeMap<String, u32>>> {
        let state = self.inner.lock();
        let mut matrix: BTreeMap<String, BTreeMap<String, u32>> = BTreeMap::new();
        for ((a, b), weight) in &state.pairs {
            matrix.entry(a.clone()).or_default().insert(b.clone(), *weight);
            matrix.entry(b.clone()).or_default().insert(a.clone(), *weight);
        }
        Ok(matrix)
    }

    async fn stats(&self) -> Result<CooccurrenceStats> {
        let state = self.inner.lock();
        let mut unique_tags = BTreeSet::new();
        for tags in state.files.values() {
            unique_tags.extend(tags.iter().cloned());
        }
        Ok(CooccurrenceStats {
            groups: state.files.len(),
            pairs: state.pairs.len(),
            unique_tags: unique_tags.len(),
        })
    }

    async fn file_count(&self) -> Result<usize> {
        Ok(self.inner.lock().files.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn recording_a_group_increments_pair_weights() {
        let db = InMemoryCooccurrenceDb::new();
        db.record_tag_group("a.md", "diary", &tags(&["cat", "dog"]))
            .await
            .unwrap();
        assert_eq!(db.pair_weight("cat", "dog").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn replacing_a_group_adjusts_delta_not_full_reset() {
        let db = InMemoryCooccurrenceDb::new();
        db.record_tag_group("a.md", "diary", &tags(&["cat", "dog"]))
            .await
            .unwrap();
        db.record_tag_group("b.md", "diary", &tags(&["cat", "dog"]))
            .await
            .unwrap();
        assert_eq!(db.pair_weight("cat", "dog").await.unwrap(), 2);

        db.record_tag_group("a.md", "diary", &tags(&["cat"]))
            .await
            .unwrap();
        assert_eq!(db.pair_weight("cat", "dog").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn removing_a_group_zeroes_its_pairs() {
        let db = InMemoryCooccurrenceDb::new();
        db.record_tag_group("a.md", "diary", &tags(&["cat", "dog"]))
            .await
            .unwrap();
        db.remove_tag_group("a.md").await.unwrap();
        assert_eq!(db.pair_weight("cat", "dog").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stats_reports_groups_pairs_and_unique_tags() {
        let db = InMemoryCooccurrenceDb::new();
        db.record_tag_group("a.md", "diary", &tags(&["cat", "dog", "bird"]))
            .await
            .unwrap();
        let stats = db.stats().await.unwrap();
        assert_eq!(stats.groups, 1);
        assert_eq!(stats.pairs, 3);
        assert_eq!(stats.unique_tags, 3);
    }
}
