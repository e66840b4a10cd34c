//! Parses the modifier grammar inside `<mods>`, plus the separate
//! meta-thinking parameter grammar inside `[[VCP元思考<params>]]`.

use serde::Serialize;

/// Parsed flags from a standard/hybrid placeholder's `<mods>` string.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Modifiers {
    pub time: bool,
    pub group: bool,
    pub rerank: bool,
    pub ai_memo: bool,
    pub tag_weight: Option<f32>,
    pub k_multiplier: f32,
}

impl Modifiers {
    fn with_default_multiplier() -> Self {
        Self {
            k_multiplier: 1.0,
            ..Default::default()
        }
    }
}

/// Split on `::` or `:`, space-insensitively, and interpret each token.
#[must_use]
pub fn parse_modifiers(raw: &str) -> Modifiers {
    let mut modifiers = Modifiers::with_default_multiplier();
    for token in split_tokens(raw) {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.eq_ignore_ascii_case("Time") {
            modifiers.time = true;
        } else if trimmed.eq_ignore_ascii_case("Group") {
            modifiers.group = true;
        } else if trimmed.eq_ignore_ascii_case("Rerank") {
            modifiers.rerank = true;
        } else if trimmed.eq_ignore_ascii_case("AIMemo") {
            modifiers.ai_memo = true;
        } else if let Some(rest) = strip_ci_prefix(trimmed, "TagMemo") {
            if let Ok(weight) = rest.parse::<f32>() {
                modifiers.tag_weight = Some(weight);
            }
        } else if let Ok(multiplier) = trimmed.parse::<f32>() {
            modifiers.k_multiplier = multiplier;
        }
    }
    modifiers
}

/// Parsed parameters from `[[VCP元思考<params>]]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaThinkingParams {
    pub auto: bool,
    pub auto_threshold: Option<f32>,
    pub chain_name: Option<String>,
    pub k_sequence: Vec<usize>,
}

/// Parse meta-thinking params: `Auto[:threshold]`, a bare chain name, and a
/// `-`-separated k-sequence, any order, `::`/`:`-delimited.
#[must_use]
pub fn parse_meta_params(raw: &str) -> MetaThinkingParams {
    let mut params = MetaThinkingParams::default();
    for token in split_tokens(raw) {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = strip_ci_prefix(trimmed, "Auto") {
            params.auto = true;
            if let Ok(threshold) = rest.parse::<f32>() {
                params.auto_threshold = Some(threshold);
            }
            continue;
        }
        if trimmed.contains('-') && trimmed.chars().all(|c| c.is_ascii_digit() || c == '-') {
            params.k_sequence = trimmed
                .split('-')
                .filter_map(|part| part.parse::<usize>().ok())
                .collect();
            continue;
        }
        if let Ok(single_k) = trimmed.parse::<usize>() {
            params.k_sequence = vec![single_k];
            continue;
        }
        params.chain_name = Some(trimmed.to_string());
    }
    params
}

fn split_tokens(raw: &str) -> Vec<String> {
    raw.replace("::", ":").split(':').map(str::to_string).collect()
}

/// Strip `prefix` from `text` case-insensitively, returning the remainder.
fn strip_ci_prefix<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    if text.len() < prefix.len() {
        return None;
    }
    let (head, tail) = text.split_at(prefix.len());
    if head.eq_ignore_ascii_case(prefix) {
        Some(tail)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rerank_and_tag_memo_and_multiplier() {
        let modifiers = parse_modifiers("Rerank::TagMemo0.3::1.5");
        assert!(modifiers.rerank);
        assert_eq!(modifiers.tag_weight, Some(0.3));
        assert!((modifiers.k_multiplier - 1.5).abs() < f32::EPSILON);
    }

    #[test]
    fn defaults_k_multiplier_to_one() {
        let modifiers = parse_modifiers("Time");
        assert!(modifiers.time);
        assert!((modifiers.k_multiplier - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn single_colon_separator_also_works() {
        let modifiers = parse_modifiers("Group:AIMemo");
        assert!(modifiers.group);
        assert!(modifiers.ai_memo);
    }

    #[test]
    fn parses_auto_threshold_chain_and_k_sequence() {
        let params = parse_meta_params(":Auto:0.7:creative_writing:1-2-3");
        assert!(params.auto);
        assert_eq!(params.auto_threshold, Some(0.7));
        assert_eq!(params.chain_name.as_deref(), Some("creative_writing"));
        assert_eq!(params.k_sequence, vec![1, 2, 3]);
    }

    #[test]
    fn bare_auto_with_no_threshold() {
        let params = parse_meta_params(":Auto:chain_a:2-2");
        assert!(params.auto);
        assert!(params.auto_threshold.is_none());
        assert_eq!(params.chain_name.as_deref(), Some("chain_a"));
    }
}
