//! Tag-line extraction and folder/name filtering.

use crate::config::EngineConfig;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static TAG_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Tag:\s*(.+)$").expect("static regex"));

/// Extract the tag set from a diary file's content.
///
/// 1. Take the last non-empty line; match it against `^Tag:\s*(.+)$`
///    (case-insensitive).
/// 2. Split on any of `,`, `，`, `、`, trimming each piece.
/// 3. Remove every super-blacklist keyword as a substring, then trim again.
/// 4. Drop tags outside `[min_len, max_len]`, in the plain blacklist, or
///    made up entirely of digits/whitespace/punctuation.
/// 5. Deduplicate (set semantics).
///
/// Files with no trailing `Tag:` line return an empty set; they are still
/// indexed for semantic search but contribute no tags.
#[must_use]
pub fn extract_tags(file_content: &str, config: &EngineConfig) -> BTreeSet<String> {
    let Some(last_line) = file_content.lines().rev().find(|line| !line.trim().is_empty()) else {
        return BTreeSet::new();
    };

    let Some(captures) = TAG_LINE.captures(last_line.trim()) else {
        return BTreeSet::new();
    };
    let raw = captures.get(1).map_or("", |m| m.as_str());

    raw.split([',', '，', '、'])
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty())
        .map(|candidate| apply_super_blacklist(candidate, &config.tag_blacklist_super))
        .filter(|tag| is_valid_tag(tag, config))
        .collect()
}

fn apply_super_blacklist(tag: &str, super_blacklist: &[String]) -> String {
    let mut result = tag.to_string();
    for keyword in super_blacklist {
        if keyword.is_empty() {
            continue;
        }
        result = result.replace(keyword.as_str(), "");
    }
    result.trim().to_string()
}

fn is_valid_tag(tag: &str, config: &EngineConfig) -> bool {
    if tag.is_empty() {
        return false;
    }
    let char_count = tag.chars().count();
    if char_count < config.tag_min_len || char_count > config.tag_max_len {
        return false;
    }
    if config.tag_blacklist.iter().any(|blocked| blocked == tag) {
        return false;
    }
    if tag
        .chars()
        .all(|c| c.is_numeric() || c.is_whitespace() || c.is_ascii_punctuation())
    {
        return false;
    }
    true
}

/// Whether `folder_name` should be skipped from tag ingestion, per the
/// configured ignore-set / prefix / suffix filters.
#[must_use]
pub fn is_ignored_folder(folder_name: &str, config: &EngineConfig) -> bool {
    if config
        .tag_ignore_folders
        .iter()
        .any(|ignored| ignored == folder_name)
    {
        return true;
    }
    if config
        .tag_ignore_prefix
        .iter()
        .any(|prefix| !prefix.is_empty() && folder_name.starts_with(prefix.as_str()))
    {
        return true;
    }
    config
        .tag_ignore_suffix
        .iter()
        .any(|suffix| !suffix.is_empty() && folder_name.ends_with(suffix.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn extracts_comma_separated_tags() {
        let content = "hello\nTag: cat, dog";
        let tags = extract_tags(content, &config());
        assert_eq!(
            tags,
            BTreeSet::from(["cat".to_string(), "dog".to_string()])
        );
    }

    #[test]
    fn handles_fullwidth_and_dun_separators() {
        let content = "hi\nTag: cat，dog、bird";
        let tags = extract_tags(content, &config());
        assert_eq!(tags.len(), 3);
    }

    #[test]
    fn no_tag_line_yields_empty_set() {
        let content = "just some diary text\nwith no tag line";
        assert!(extract_tags(content, &config()).is_empty());
    }

    #[test]
    fn digits_only_tags_are_rejected() {
        let content = "hi\nTag: 123, cat";
        let tags = extract_tags(content, &config());
        assert_eq!(tags, BTreeSet::from(["cat".to_string()]));
    }

    #[test]
    fn super_blacklist_removes_substring_before_validation() {
        let mut cfg = config();
        cfg.tag_blacklist_super = vec!["secret_".to_string()];
        let content = "hi\nTag: secret_cat, dog";
        let tags = extract_tags(content, &cfg);
        assert_eq!(
            tags,
            BTreeSet::from(["cat".to_string(), "dog".to_string()])
        );
    }

    #[test]
    fn is_case_insensitive_on_tag_keyword() {
        let content = "hi\ntag: cat";
        assert_eq!(
            extract_tags(content, &config()),
            BTreeSet::from(["cat".to_string()])
        );
    }

    #[test]
    fn ignored_folder_by_exact_name() {
        let mut cfg = config();
        cfg.tag_ignore_folders = vec!["_archive".to_string()];
        assert!(is_ignored_folder("_archive", &cfg));
        assert!(!is_ignored_folder("diary_one", &cfg));
    }

    #[test]
    fn ignored_folder_by_prefix_and_suffix() {
        let mut cfg = config();
        cfg.tag_ignore_prefix = vec![".".to_string()];
        cfg.tag_ignore_suffix = vec![".bak".to_string()];
        assert!(is_ignored_folder(".hidden", &cfg));
        assert!(is_ignored_folder("notes.bak", &cfg));
        assert!(!is_ignored_folder("notes", &cfg));
    }
}
