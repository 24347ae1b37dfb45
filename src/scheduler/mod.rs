//! Recompilation scheduling.
//!
//! ```text
//! change ─▶ debounce ─▶ dirty set ─▶ continuation ─┐
//!                                                   ▼
//!                         pending lock (FIFO) ─▶ take dirty ─▶ job
//! ```
//!
//! Every job of one instance holds the pending lock while it runs, so jobs
//! never overlap. The dirty set is taken when a job starts: changes that
//! arrive while it runs land in the next set. A continuation that finds the
//! set empty does nothing.

mod debouncer;
mod watcher;


pub use debouncer::{ChangeDebouncer, DEBOUNCE};
pub use watcher::SourceWatcher;

use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// Dirty-file tracking and job serialization for one compiler instance.
#[derive(Debug, Default)]
pub struct RecompileScheduler {
    dirty: Mutex<BTreeSet<PathBuf>>,
    pending: tokio::sync::Mutex<()>,
    debouncer: Mutex<ChangeDebouncer>,
}

impl RecompileScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `path` for debouncing, stamping it now.
    pub fn watch(&self, path: &Path) -> bool {
        self.debouncer.lock().watch(path)
    }

    /// Debounce a change notification for `path`.
    pub fn accept_change(&self, path: &Path) -> bool {
        self.debouncer.lock().accept(path)
    }

    pub fn mark_dirty(&self, file: PathBuf) {
        self.dirty.lock().insert(file);
    }

    /// Snapshot and clear the dirty set.
    pub fn take_dirty(&self) -> Vec<PathBuf> {
        std::mem::take(&mut *self.dirty.lock())
            .into_iter()
            .collect()
    }

    pub fn dirty_len(&self) -> usize {
        self.dirty.lock().len()
    }

    /// Run `job` with the pending lock held.
    pub async fn run_exclusive<F: Future>(&self, job: F) -> F::Output {
        let _pending = self.pending.lock().await;
        job.await
    }

    /// Append a continuation to the pending chain.
    ///
    /// Once it holds the lock it takes the dirty set and runs `job` over it.
    /// Resolves to `None` when there was nothing to do.
    pub fn schedule<F, Fut>(self: &Arc<Self>, job: F) -> JoinHandle<Option<Fut::Output>>
    where
        F: FnOnce(Vec<PathBuf>) -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let _pending = scheduler.pending.lock().await;
            let files = scheduler.take_dirty();
            if files.is_empty() {
                return None;
            }
            Some(job(files).await)
        })
    }
}
