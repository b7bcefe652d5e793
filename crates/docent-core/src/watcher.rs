//! File watcher for the docs root. Re-scans when sources change so the index can be rebuilt.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify_debouncer_mini::notify::{self, RecommendedWatcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};

use crate::docs::{scan_docs, Doc, ScanError};

const DEBOUNCE: Duration = Duration::from_millis(400);

/// Keeps the watch alive; dropping it stops watching.
pub struct DocsWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    root: PathBuf,
}

impl DocsWatcher {
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Watches `root` recursively and calls `on_change` with a fresh scan whenever a
/// doc source changes (debounced). Changes under hidden directories are ignored.
pub fn watch_docs(
    root: &Path,
    on_change: impl Fn(Result<Vec<Doc>, ScanError>) + Send + 'static,
) -> Result<DocsWatcher, WatchError> {
    if !root.is_dir() {
        return Err(WatchError::NotADirectory(root.to_path_buf()));
    }
    let root = root.canonicalize().map_err(WatchError::Canonicalize)?;
    let root_for_callback = root.clone();

    let mut debouncer = new_debouncer(DEBOUNCE, move |res: DebounceEventResult| match res {
        Ok(events) => {
            let relevant = events
                .iter()
                .any(|e| is_doc_change(&root_for_callback, &e.path));
            if relevant {
                on_change(scan_docs(&root_for_callback));
            }
        }
        Err(e) => tracing::warn!(error = %e, "docs watcher error"),
    })
    .map_err(|e| WatchError::Notify(e.to_string()))?;

    debouncer
        .watcher()
        .watch(&root, notify::RecursiveMode::Recursive)
        .map_err(|e| WatchError::Watch(e.to_string()))?;
    tracing::info!(root = %root.display(), "watching docs");

    Ok(DocsWatcher {
        _debouncer: debouncer,
        root,
    })
}

/// Doc files outside hidden directories. Index output usually lives in one (e.g. `.knowledge/`).
fn is_doc_change(root: &Path, path: &Path) -> bool {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let hidden = rel
        .components()
        .any(|c| c.as_os_str().to_str().is_some_and(|s| s.starts_with('.')));
    let doc = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == "md" || e == "mdx");
    doc && !hidden
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("failed to resolve path: {0}")]
    Canonicalize(std::io::Error),
    #[error("watcher init: {0}")]
    Notify(String),
    #[error("watch failed: {0}")]
    Watch(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_visible_doc_files_trigger() {
        let root = Path::new("/site/docs");
        assert!(is_doc_change(root, Path::new("/site/docs/manual/xsml.mdx")));
        assert!(is_doc_change(root, Path::new("/site/docs/intro.md")));
        assert!(!is_doc_change(root, Path::new("/site/docs/.knowledge/a.md")));
        assert!(!is_doc_change(root, Path::new("/site/docs/embeddings.json")));
    }

    #[test]
    fn watch_rejects_missing_root() {
        let err = watch_docs(Path::new("/definitely/not/here"), |_| {}).err();
        assert!(matches!(err, Some(WatchError::NotADirectory(_))));
    }
}
