//! Vector similarity helpers.
//!
//! Whether similarity is computed as L2 distance over normalized vectors or
//! explicit cosine is a real design choice; we commit to: **all vectors
//! stored in an index are L2-normalized on insertion**, and search scores
//! are reported as `1 - l2_distance`, which for unit vectors is a monotonic
//! transform of cosine similarity (`1 - ||a-b||^2/2 = cos(a,b)` for unit `a`,
//! `b`). This keeps the ANN index itself a pure L2 index while giving
//! callers a cosine-like `[-1, 1]` score. See `DESIGN.md` for the full
//! resolution.

/// Cosine similarity between two vectors. Returns `0.0` if either vector is
/// zero-length or has zero magnitude.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Squared L2 (Euclidean) distance between two vectors.
#[must_use]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// L2 norm (magnitude) of a vector.
#[must_use]
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Return a unit-length copy of `v`. Zero vectors are returned unchanged.
#[must_use]
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm = l2_norm(v);
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

/// Convert an L2 distance between two unit vectors into a `1 - distance`
/// similarity score, per the convention documented on this module.
#[must_use]
pub fn distance_to_score(distance: f32) -> f32 {
    1.0 - distance
}

/// Jaccard similarity between two tag sets, used for the tag-overlap boost.
#[must_use]
pub fn jaccard(a: &[String], b: &[String]) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let set_a: std::collections::HashSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: std::collections::HashSet<&str> = b.iter().map(String::as_str).collect();
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_vectors_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_produces_unit_vector() {
        let v = vec![3.0, 4.0];
        let normalized = l2_normalize(&v);
        assert!((l2_norm(&normalized) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn jaccard_disjoint_sets_is_zero() {
        let a = vec!["cat".to_string()];
        let b = vec!["dog".to_string()];
        assert_eq!(jaccard(&a, &b), 0.0);
    }

    #[test]
    fn jaccard_identical_sets_is_one() {
        let a = vec!["cat".to_string(), "dog".to_string()];
        assert_eq!(jaccard(&a, &a.clone()), 1.0);
    }

    #[test]
    fn jaccard_partial_overlap() {
        let a = vec!["cat".to_string(), "dog".to_string()];
        let b = vec!["dog".to_string(), "bird".to_string()];
        // intersection = {dog} = 1, union = {cat, dog, bird} = 3
        assert!((jaccard(&a, &b) - (1.0 / 3.0)).abs() < 1e-6);
    }
}
