//! Tag vector search and tag-seed expansion.

use super::cooccurrence::TagCooccurrenceDB;
use super::GlobalTag;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::vector_index::VectorIndex;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// One hit from [`similar_tags_by_vector`].
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarTag {
    /// The matched tag string.
    pub tag: String,
    /// `1 - l2_distance` similarity score.
    pub score: f32,
    /// Number of registry entries carrying this tag.
    pub frequency: u32,
    /// Number of diaries carrying this tag.
    pub diary_count: usize,
    /// The diary names carrying this tag.
    pub diaries: Vec<String>,
}

/// Search the global tag index for the `k` tags nearest a query vector.
///
/// Ties are broken by frequency descending, then tag lexicographic.
#[must_use]
pub fn similar_tags_by_vector(
    index: &VectorIndex,
    tags: &HashMap<String, GlobalTag>,
    query: &[f32],
    k: usize,
) -> Vec<SimilarTag> {
    let neighbors = index.search_knn(query, k, 64.max(k));
    let mut hits: Vec<SimilarTag> = neighbors
        .into_iter()
        .filter_map(|neighbor| {
            tags.get(&neighbor.label).map(|entry| SimilarTag {
                tag: neighbor.label,
                score: neighbor.score,
                frequency: entry.frequency,
                diary_count: entry.diaries.len(),
                diaries: entry.diaries.iter().cloned().collect(),
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.frequency.cmp(&a.frequency))
            .then_with(|| a.tag.cmp(&b.tag))
    });
    hits
}

/// One candidate returned by [`expand_tags`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedTag {
    /// The candidate tag.
    pub tag: String,
    /// Total cooccurrence weight summed across contributing seeds.
    pub weight: u32,
    /// The seed tags that contributed an edge to this candidate.
    pub sources: Vec<String>,
    /// Number of distinct seeds contributing (`sources.len()`).
    pub source_count: usize,
    /// `weight / source_count`.
    pub avg_weight: f32,
}

/// Expand a tag seed set into related tags via the cooccurrence graph.
///
/// 1. For each seed, pull its row from the pair-weight matrix.
/// 2. Accumulate candidates, skipping the seeds themselves and any edge
///    below `config.tag_expand_min_weight`.
/// 3. Sort by `(source_count desc, avg_weight desc, total_weight desc)` when
///    `prefer_multi_source`; otherwise by total weight desc.
/// 4. Return the top `config.tag_expand_max_count`.
///
/// # Errors
/// Propagates errors from the `cooccurrence` backend.
pub async fn expand_tags(
    cooccurrence: &dyn TagCooccurrenceDB,
    seeds: &[String],
    config: &EngineConfig,
) -> Result<Vec<ExpandedTag>> {
    let seed_set: HashSet<&str> = seeds.iter().map(String::as_str).collect();
    let mut accum: HashMap<String, (u32, HashSet<String>)> = HashMap::new();

    for seed in seeds {
        for (candidate, weight) in cooccurrence.pairs_for(seed).await? {
            if seed_set.contains(candidate.as_str()) {
                continue;
            }
            if weight < config.tag_expand_min_weight {
                continue;
            }
            let entry = accum.entry(candidate).or_insert((0, HashSet::new()));
            entry.0 += weight;
            entry.1.insert(seed.clone());
        }
    }

    let mut candidates: Vec<ExpandedTag> = accum
        .into_iter()
        .map(|(tag, (total_weight, sources))| {
            let source_count = sources.len();
            let mut sources: Vec<String> = sources.into_iter().collect();
            sources.sort();
            ExpandedTag {
                tag,
                weight: total_weight,
                avg_weight: total_weight as f32 / source_count.max(1) as f32,
                source_count,
                sources,
            }
        })
        .collect();

    if config.tag_expand_prefer_multi_source {
        candidates.sort_by(|a, b| {
            b.source_count
                .cmp(&a.source_count)
                .then_with(|| b.avg_weight.partial_cmp(&a.avg_weight).unwrap_or(Ordering::Equal))
                .then_with(|| b.weight.cmp(&a.weight))
                .then_with(|| a.tag.cmp(&b.tag))
        });
    } else {
        candidates.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.tag.cmp(&b.tag)));
    }

    candidates.truncate(config.tag_expand_max_count);
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::cooccurrence::InMemoryCooccurrenceDb;
    use std::collections::BTreeSet;

    fn tagset(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn expansion_ranking_matches_scenario_six() {
        let db = InMemoryCooccurrenceDb::new();
        // pairs(cat,mouse)=4 across 4 files
        for i in 0..4 {
            db.record_tag_group(&format!("cm{i}"), "A", &tagset(&["cat", "mouse"]))
                .await
                .unwrap();
        }
        // pairs(dog,mouse)=3
        for i in 0..3 {
            db.record_tag_group(&format!("dm{i}"), "A", &tagset(&["dog", "mouse"]))
                .await
                .unwrap();
        }
        // pairs(cat,bird)=5
        for i in 0..5 {
            db.record_tag_group(&format!("cb{i}"), "A", &tagset(&["cat", "bird"]))
                .await
                .unwrap();
        }
        // pairs(dog,fish)=2
        for i in 0..2 {
            db.record_tag_group(&format!("df{i}"), "A", &tagset(&["dog", "fish"]))
                .await
                .unwrap();
        }

        let mut config = EngineConfig::default();
        config.tag_expand_min_weight = 2;
        config.tag_expand_prefer_multi_source = true;

        let seeds = vec!["cat".to_string(), "dog".to_string()];
        let expanded = expand_tags(&db, &seeds, &config).await.unwrap();

        let mouse_rank = expanded.iter().position(|e| e.tag == "mouse").unwrap();
        let bird_rank = expanded.iter().position(|e| e.tag == "bird").unwrap();
        assert!(mouse_rank < bird_rank, "mouse (multi-source) should rank before bird");

        let mouse = &expanded[mouse_rank];
        assert_eq!(mouse.source_count, 2);
        assert!((mouse.avg_weight - 3.5).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn expansion_excludes_seeds_and_low_weight_edges() {
        let db = InMemoryCooccurrenceDb::new();
        db.record_tag_group("a.md", "A", &tagset(&["cat", "dog"]))
            .await
            .unwrap();

        let config = EngineConfig {
            tag_expand_min_weight: 5,
            ..EngineConfig::default()
        };
        let expanded = expand_tags(&db, &["cat".to_string()], &config)
            .await
            .unwrap();
        assert!(expanded.is_empty());
    }
}
