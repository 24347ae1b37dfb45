//! Filesystem watcher feeding source changes to the scheduler.
//!
//! ```text
//! notify (own thread) → unbounded channel → task → on_change(path)
//! ```

use std::path::{Path, PathBuf};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::compiler::output::SOURCE_EXTENSION;
use crate::log;

/// Watches a source directory for as long as it is alive.
pub struct SourceWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl SourceWatcher {
    /// Watch `root` recursively and call `on_change` for each changed source.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn<F>(root: &Path, on_change: F) -> notify::Result<Self>
    where
        F: Fn(PathBuf) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    for path in changed_sources(&event) {
                        let _ = tx.send(path);
                    }
                }
                Err(e) => log!("watch"; "notify error: {}", e),
            }
        })?;
        watcher.watch(root, RecursiveMode::Recursive)?;

        let task = tokio::spawn(async move {
            while let Some(path) = rx.recv().await {
                on_change(path);
            }
        });

        Ok(Self {
            _watcher: watcher,
            task,
        })
    }
}

impl Drop for SourceWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Template sources touched by `event`.
///
/// Removals and metadata-only changes are ignored, as are editor temp files.
fn changed_sources(event: &notify::Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) => {}
        EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(_) => {}
        _ => return Vec::new(),
    }

    event
        .paths
        .iter()
        .filter(|path| !is_temp_file(path) && is_source(path))
        .cloned()
        .collect()
}

fn is_source(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(SOURCE_EXTENSION)
}

/// Editor backup and swap files.
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}
