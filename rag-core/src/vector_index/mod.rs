//! Thin wrapper over an HNSW-class ANN index with label-keyed lookups and
//! raw-vector persistence.
//!
//! An L2 HNSW-class ANN structure with resize semantics (grow at 90%
//! capacity, 1.5x growth) and checksum-validated persistence. We use
//! `hnsw_rs` (grounded on
//! `examples/other_examples/manifests/architehc-selfware/Cargo.toml`, the
//! only pack manifest that depends on it) for the graph itself, but do not
//! rely on its own (de)serialization: on save we persist the raw vectors and
//! labels we already keep for bookkeeping, and on load we rebuild the graph
//! by replaying inserts. This sidesteps version-coupling the on-disk format
//! to `hnsw_rs` internals.

mod persistence;

use crate::constants::{
    HNSW_EF_CONSTRUCTION, HNSW_MAX_LAYER, HNSW_MAX_NB_CONNECTION, INDEX_GROWTH_FACTOR,
    INDEX_GROWTH_THRESHOLD,
};
use crate::embedding::similarity::l2_normalize;
use crate::error::{Error, Result};
use hnsw_rs::dist::DistL2;
use hnsw_rs::hnsw::Hnsw;
use std::collections::HashMap;

pub use persistence::{IndexSnapshot, SnapshotEntry};

/// One nearest-neighbor hit.
#[derive(Debug, Clone)]
pub struct Neighbor {
    /// Caller-assigned label for the matched vector (chunk id, tag name, ...).
    pub label: String,
    /// `1 - l2_distance`, per the crate-wide similarity convention.
    pub score: f32,
}

/// A resizable, label-addressed ANN index over L2-normalized vectors.
pub struct VectorIndex {
    dimension: usize,
    max_elements: usize,
    vectors: Vec<Vec<f32>>,
    labels: Vec<String>,
    label_to_slot: HashMap<String, usize>,
    hnsw: Hnsw<'static, f32, DistL2>,
}

impl VectorIndex {
    /// Construct an empty index for `dimension`-length vectors with initial
    /// capacity `max_elements`.
    #[must_use]
    pub fn new(dimension: usize, max_elements: usize) -> Self {
        let max_elements = max_elements.max(1);
        Self {
            dimension,
            max_elements,
            vectors: Vec::new(),
            labels: Vec::new(),
            label_to_slot: HashMap::new(),
            hnsw: Self::build_graph(max_elements),
        }
    }

    fn build_graph(max_elements: usize) -> Hnsw<'static, f32, DistL2> {
        Hnsw::new(
            HNSW_MAX_NB_CONNECTION,
            max_elements,
            HNSW_MAX_LAYER,
            HNSW_EF_CONSTRUCTION,
            DistL2 {},
        )
    }

    /// Number of vectors currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether the index holds no vectors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Configured vector dimensionality.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Insert or replace the vector for `label`. The vector is L2-normalized
    /// before storage, per the crate-wide similarity convention.
    ///
    /// Grows the index (1.5x) when insertion would cross
    /// 90% of `max_elements`, and rebuilds the graph from the retained raw
    /// vectors.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] if `vector.len() != self.dimension()`.
    pub fn upsert(&mut self, label: impl Into<String>, vector: Vec<f32>) -> Result<()> {
        let label = label.into();
        if vector.len() != self.dimension {
            return Err(Error::InvalidInput(format!(
                "vector has dimension {} but index expects {}",
                vector.len(),
                self.dimension
            )));
        }
        let normalized = l2_normalize(&vector);

        if let Some(&slot) = self.label_to_slot.get(&label) {
            self.vectors[slot] = normalized;
            self.rebuild_graph();
            return Ok(());
        }

        let projected = self.vectors.len() + 1;
        if (projected as f64) > self.max_elements as f64 * INDEX_GROWTH_THRESHOLD {
            self.grow();
        }
        if self.vectors.len() >= self.max_elements {
            return Err(Error::CapacityExceeded {
                current: self.vectors.len(),
                max: self.max_elements,
            });
        }

        let slot = self.vectors.len();
        self.vectors.push(normalized.clone());
        self.labels.push(label.clone());
        self.label_to_slot.insert(label, slot);
        self.hnsw.insert((&normalized, slot));
        Ok(())
    }

    /// Remove `label` from the index, if present. Rebuilds the graph, since
    /// `hnsw_rs` has no point-removal primitive.
    pub fn remove(&mut self, label: &str) -> bool {
        let Some(slot) = self.label_to_slot.remove(label) else {
            return false;
        };
        self.vectors.remove(slot);
        self.labels.remove(slot);
        self.label_to_slot.clear();
        for (idx, existing_label) in self.labels.iter().enumerate() {
            self.label_to_slot.insert(existing_label.clone(), idx);
        }
        self.rebuild_graph();
        true
    }

    fn grow(&mut self) {
        let new_capacity = ((self.max_elements as f64) * INDEX_GROWTH_FACTOR).ceil() as usize;
        self.max_elements = new_capacity.max(self.max_elements + 1);
        self.rebuild_graph();
    }

    fn rebuild_graph(&mut self) {
        let mut graph = Self::build_graph(self.max_elements);
        for (slot, vector) in self.vectors.iter().enumerate() {
            graph.insert((vector, slot));
        }
        self.hnsw = graph;
    }

    /// Search for the `k` nearest neighbors of a query vector. The query is
    /// L2-normalized before the search, matching the stored-vector
    /// convention.
    #[must_use]
    pub fn search_knn(&self, query: &[f32], k: usize, ef_search: usize) -> Vec<Neighbor> {
        if self.vectors.is_empty() || k == 0 {
            return Vec::new();
        }
        let normalized = l2_normalize(query);
        let results = self.hnsw.search(&normalized, k, ef_search.max(k));
        results
            .into_iter()
            .filter_map(|neighbour| {
                self.labels.get(neighbour.d_id).map(|label| Neighbor {
                    label: label.clone(),
                    score: crate::embedding::similarity::distance_to_score(neighbour.distance),
                })
            })
            .collect()
    }

    /// Build a serializable snapshot of the raw vectors and labels.
    #[must_use]
    pub fn snapshot(&self) -> IndexSnapshot {
        IndexSnapshot {
            dimension: self.dimension,
            max_elements: self.max_elements,
            entries: self
                .labels
                .iter()
                .zip(&self.vectors)
                .map(|(label, vector)| SnapshotEntry {
                    label: label.clone(),
                    vector: vector.clone(),
                })
                .collect(),
        }
    }

    /// Rebuild an index from a snapshot produced by [`VectorIndex::snapshot`].
    #[must_use]
    pub fn from_snapshot(snapshot: IndexSnapshot) -> Self {
        let mut index = Self::new(snapshot.dimension, snapshot.max_elements.max(1));
        for entry in snapshot.entries {
            let slot = index.vectors.len();
            index.vectors.push(entry.vector);
            index.labels.push(entry.label.clone());
            index.label_to_slot.insert(entry.label, slot);
        }
        index.rebuild_graph();
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_then_search_returns_self_as_nearest() {
        let mut index = VectorIndex::new(3, 16);
        index.upsert("a", vec![1.0, 0.0, 0.0]).unwrap();
        index.upsert("b", vec![0.0, 1.0, 0.0]).unwrap();
        index.upsert("c", vec![0.0, 0.0, 1.0]).unwrap();

        let hits = index.search_knn(&[1.0, 0.0, 0.0], 1, 32);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].label, "a");
    }

    #[test]
    fn mismatched_dimension_is_rejected() {
        let mut index = VectorIndex::new(3, 16);
        let err = index.upsert("a", vec![1.0, 0.0]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn remove_drops_label_from_results() {
        let mut index = VectorIndex::new(2, 16);
        index.upsert("a", vec![1.0, 0.0]).unwrap();
        index.upsert("b", vec![0.0, 1.0]).unwrap();
        assert!(index.remove("a"));
        let hits = index.search_knn(&[1.0, 0.0], 2, 32);
        assert!(hits.iter().all(|h| h.label != "a"));
    }

    #[test]
    fn growth_triggers_before_capacity_is_reached() {
        let mut index = VectorIndex::new(2, 4);
        for i in 0..4 {
            index
                .upsert(format!("v{i}"), vec![i as f32, 1.0])
                .unwrap();
        }
        assert!(index.max_elements > 4);
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn snapshot_roundtrip_preserves_search_results() {
        let mut index = VectorIndex::new(2, 16);
        index.upsert("a", vec![1.0, 0.0]).unwrap();
        index.upsert("b", vec![0.0, 1.0]).unwrap();

        let restored = VectorIndex::from_snapshot(index.snapshot());
        let hits = restored.search_knn(&[1.0, 0.0], 1, 32);
        assert_eq!(hits[0].label, "a");
    }
}
