//! File-system watching that feeds the [`super::manager::TagManagerHandle`]
//! mailbox. Gated behind the `watch` feature, using `notify-debouncer-full`
//! for debounced, ordered change events.

use super::extraction::is_ignored_folder;
use super::manager::TagManagerHandle;
use crate::config::EngineConfig;
use crate::constants::FILE_WATCH_DEBOUNCE_MS;
use notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, FileIdMap};
use std::path::{Path, PathBuf};
use tracing::warn;

/// A running diary-root file watcher. Dropping this stops the watch.
pub struct DiaryWatcher {
    _debouncer: Debouncer<notify::RecommendedWatcher, FileIdMap>,
}

/// Start watching `root` for diary file changes, forwarding debounced
/// events to `handle`. File-watch events for the same path are serialized
/// FIFO per directory by the debouncer's own event ordering.
///
/// # Errors
/// Returns [`crate::Error::External`] if the underlying watcher cannot be
/// created or the root cannot be watched.
pub fn watch_diary_root(
    root: &Path,
    handle: TagManagerHandle,
    config: EngineConfig,
) -> crate::error::Result<DiaryWatcher> {
    let root_owned = root.to_path_buf();
    let rt_handle = tokio::runtime::Handle::current();

    let mut debouncer = new_debouncer(
        std::time::Duration::from_millis(FILE_WATCH_DEBOUNCE_MS),
        None,
        move |result: DebounceEventResult| {
            let Ok(events) = result else {
                if let Err(errors) = result {
                    for error in errors {
                        warn!(?error, "file watcher error");
                    }
                }
                return;
            };
            for event in events {
                for path in &event.paths {
                    let Some(diary) = diary_name(&root_owned, path, &config) else {
                        continue;
                    };
                    let handle = handle.clone();
                    let path_owned = path.clone();
                    let kind = event.kind;
                    rt_handle.spawn(async move {
                        dispatch_event(handle, kind, &path_owned, diary).await;
                    });
                }
            }
        },
    )
    .map_err(|e| crate::error::Error::External(e.into()))?;

    debouncer
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| crate::error::Error::External(e.into()))?;

    Ok(DiaryWatcher {
        _debouncer: debouncer,
    })
}

fn diary_name(root: &Path, path: &Path, config: &EngineConfig) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let diary = relative.components().next()?;
    let diary = diary.as_os_str().to_string_lossy().to_string();
    if is_ignored_folder(&diary, config) {
        return None;
    }
    Some(diary)
}

async fn dispatch_event(
    handle: TagManagerHandle,
    kind: notify::EventKind,
    path: &PathBuf,
    diary: String,
) {
    use notify::EventKind;

    let path_str = path.to_string_lossy().to_string();
    match kind {
        EventKind::Remove(_) => {
            let _ = handle.file_removed(path_str).await;
        }
        EventKind::Create(_) | EventKind::Modify(_) => {
            let Ok(content) = tokio::fs::read_to_string(path).await else {
                return;
            };
            let _ = handle.file_changed(path_str, diary, content).await;
        }
        _ => {}
    }
}
