//! Maps detected keyword groups in a query to weighted enhancement vectors,
//! driving the `Group` placeholder modifier.

use crate::embedding::similarity::l2_normalize;
use std::collections::HashMap;

/// A named keyword cluster with a pre-embedded enhancement vector. Any
/// keyword hit in a query text activates the group proportionally to how
/// many of its keywords matched.
#[derive(Debug, Clone)]
pub struct SemanticGroup {
    pub name: String,
    pub keywords: Vec<String>,
    pub enhancement_vector: Vec<f32>,
}

/// One group's activation against a piece of text.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupActivation {
    pub group_name: String,
    /// Fraction of `keywords` that matched, in `(0, 1]`.
    pub activation: f32,
    pub matched_words: Vec<String>,
}

/// Holds the configured groups and does keyword-activation detection plus
/// query-vector enhancement merging.
#[derive(Default)]
pub struct SemanticGroupManager {
    groups: Vec<SemanticGroup>,
}

impl SemanticGroupManager {
    /// A manager over `groups`.
    #[must_use]
    pub fn new(groups: Vec<SemanticGroup>) -> Self {
        Self { groups }
    }

    /// Which groups activate against `text`, with per-group activation
    /// strength (matched keyword count / total keyword count) and the
    /// matched words themselves, for the `[激活的语义组:]` trace block.
    #[must_use]
    pub fn detect_activations(&self, text: &str) -> Vec<GroupActivation> {
        self.groups
            .iter()
            .filter_map(|group| {
                if group.keywords.is_empty() {
                    return None;
                }
                let matched: Vec<String> = group
                    .keywords
                    .iter()
                    .filter(|kw| text.contains(kw.as_str()))
                    .cloned()
                    .collect();
                if matched.is_empty() {
                    return None;
                }
                let activation = matched.len() as f32 / group.keywords.len() as f32;
                Some(GroupActivation {
                    group_name: group.name.clone(),
                    activation,
                    matched_words: matched,
                })
            })
            .collect()
    }

    /// Merge `query` with each activated group's enhancement vector,
    /// weighted by activation strength, then re-normalize. Returns `query`
    /// unchanged (normalized) if no groups activate.
    #[must_use]
    pub fn enhance_query(&self, query: &[f32], activations: &[GroupActivation]) -> Vec<f32> {
        if activations.is_empty() || query.is_empty() {
            return l2_normalize(query);
        }
        let by_name: HashMap<&str, &SemanticGroup> =
            self.groups.iter().map(|g| (g.name.as_str(), g)).collect();

        let mut merged = query.to_vec();
        for activation in activations {
            let Some(group) = by_name.get(activation.group_name.as_str()) else {
                continue;
            };
            if group.enhancement_vector.len() != merged.len() {
                continue;
            }
            for (slot, value) in merged.iter_mut().zip(&group.enhancement_vector) {
                *slot += activation.activation * value;
            }
        }
        l2_normalize(&merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SemanticGroupManager {
        SemanticGroupManager::new(vec![SemanticGroup {
            name: "work".to_string(),
            keywords: vec!["会议".to_string(), "项目".to_string()],
            enhancement_vector: vec![0.0, 1.0],
        }])
    }

    #[test]
    fn partial_keyword_match_yields_fractional_activation() {
        let manager = manager();
        let activations = manager.detect_activations("今天开了个会议");
        assert_eq!(activations.len(), 1);
        assert!((activations[0].activation - 0.5).abs() < f32::EPSILON);
        assert_eq!(activations[0].matched_words, vec!["会议".to_string()]);
    }

    #[test]
    fn no_match_yields_no_activation() {
        let manager = manager();
        assert!(manager.detect_activations("今天天气真好").is_empty());
    }

    #[test]
    fn enhancement_shifts_query_toward_group_vector() {
        let manager = manager();
        let activations = manager.detect_activations("会议 项目 都搞定了");
        let enhanced = manager.enhance_query(&[1.0, 0.0], &activations);
        assert!(enhanced[1] > 0.0);
    }

    #[test]
    fn no_activation_returns_normalized_query_unchanged() {
        let manager = manager();
        let enhanced = manager.enhance_query(&[3.0, 4.0], &[]);
        assert!((enhanced[0] - 0.6).abs() < 1e-5);
        assert!((enhanced[1] - 0.8).abs() < 1e-5);
    }
}
