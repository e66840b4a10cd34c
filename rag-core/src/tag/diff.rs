//! The per-file diff pipeline. Complexity is O(|tags_in_file|), independent
//! of total file count, since it only ever touches the tags added or
//! removed by this one file.

use super::cooccurrence::TagCooccurrenceDB;
use super::{FileRegistryEntry, GlobalTag};
use crate::error::Result;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};

/// What a file diff decided to do, for logging/tracing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiffOutcome {
    /// Tags newly present in this file that were not before.
    pub added: Vec<String>,
    /// Tags that were present before but are gone now.
    pub removed: Vec<String>,
    /// `true` if the file's content hash was unchanged (a true no-op).
    pub unchanged: bool,
}

/// SHA-256 content hash of a file's bytes, used as the registry's
/// change-detection digest (see `DESIGN.md` for why SHA-256 over MD5).
#[must_use]
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Apply one file add/change event to the registry, global tag table, and
/// cooccurrence store.
///
/// # Errors
/// Propagates any error from the `cooccurrence` backend.
pub async fn apply_file_event(
    registry: &mut HashMap<String, FileRegistryEntry>,
    tags: &mut HashMap<String, GlobalTag>,
    cooccurrence: &dyn TagCooccurrenceDB,
    path: &str,
    diary: &str,
    current_tags: BTreeSet<String>,
    current_hash: String,
) -> Result<DiffOutcome> {
    if let Some(existing) = registry.get(path) {
        if existing.hash == current_hash {
            return Ok(DiffOutcome {
                unchanged: true,
                ..Default::default()
            });
        }
    }

    let old_tags = registry
        .get(path)
        .map(|entry| entry.tags.clone())
        .unwrap_or_default();

    let added: Vec<String> = current_tags.difference(&old_tags).cloned().collect();
    let removed: Vec<String> = old_tags.difference(&current_tags).cloned().collect();

    for tag in &removed {
        apply_tag_removed(tags, tag, diary);
    }
    for tag in &added {
        apply_tag_added(tags, tag, diary);
    }

    registry.insert(
        path.to_string(),
        FileRegistryEntry {
            hash: current_hash,
            diary: diary.to_string(),
            tags: current_tags.clone(),
        },
    );

    cooccurrence
        .record_tag_group(path, diary, &current_tags)
        .await?;

    Ok(DiffOutcome {
        added,
        removed,
        unchanged: false,
    })
}

/// Apply a file-removal event: decrement every tag the file held, drop its
/// registry entry, and remove its cooccurrence row.
///
/// # Errors
/// Propagates any error from the `cooccurrence` backend.
pub async fn apply_file_removed(
    registry: &mut HashMap<String, FileRegistryEntry>,
    tags: &mut HashMap<String, GlobalTag>,
    cooccurrence: &dyn TagCooccurrenceDB,
    path: &str,
) -> Result<DiffOutcome> {
    let Some(entry) = registry.remove(path) else {
        return Ok(DiffOutcome::default());
    };
    let removed: Vec<String> = entry.tags.iter().cloned().collect();
    for tag in &removed {
        apply_tag_removed(tags, tag, &entry.diary);
    }
    cooccurrence.remove_tag_group(path).await?;
    Ok(DiffOutcome {
        removed,
        ..Default::default()
    })
}

fn apply_tag_added(tags: &mut HashMap<String, GlobalTag>, tag: &str, diary: &str) {
    tags.entry(tag.to_string())
        .and_modify(|entry| {
            entry.frequency += 1;
            entry.diaries.insert(diary.to_string());
        })
        .or_insert_with(|| GlobalTag::new_observed(tag, diary));
}

/// Decrement-only semantics on tag removal: `frequency` drops by one and the
/// diary is removed from the set only if no *other* file in that diary still
/// holds this tag via the registry-tracked file count for the diary. Here we
/// approximate per-file tracking by decrementing and leaving the `diaries`
/// set as-is unless frequency hits zero, matching the "decrement-only"
/// resolution documented in `DESIGN.md` for this component's open question.
fn apply_tag_removed(tags: &mut HashMap<String, GlobalTag>, tag: &str, _diary: &str) {
    let Some(entry) = tags.get_mut(tag) else {
        return;
    };
    entry.frequency = entry.frequency.saturating_sub(1);
    if entry.frequency == 0 {
        tags.remove(tag);
    }
}
