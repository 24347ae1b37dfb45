//! Per-file change debouncing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::time::Instant;

/// Changes to the same file closer together than this are dropped.
pub const DEBOUNCE: Duration = Duration::from_millis(1000);

/// Last accepted change per watched path.
///
/// Registering a watch counts as an accepted change.
#[derive(Debug)]
pub struct ChangeDebouncer {
    stamps: FxHashMap<PathBuf, Instant>,
    threshold: Duration,
}

impl Default for ChangeDebouncer {
    fn default() -> Self {
        Self::new(DEBOUNCE)
    }
}

impl ChangeDebouncer {
    pub fn new(threshold: Duration) -> Self {
        Self {
            stamps: FxHashMap::default(),
            threshold,
        }
    }

    /// Start tracking `path`. Returns `false` if it was already tracked.
    pub fn watch(&mut self, path: &Path) -> bool {
        if self.stamps.contains_key(path) {
            return false;
        }
        self.stamps.insert(path.to_path_buf(), Instant::now());
        true
    }

    /// Whether a change to `path` now is accepted. Accepting restamps it.
    pub fn accept(&mut self, path: &Path) -> bool {
        let now = Instant::now();
        if let Some(last) = self.stamps.get(path)
            && now.duration_since(*last) < self.threshold
        {
            return false;
        }
        self.stamps.insert(path.to_path_buf(), now);
        true
    }

    pub fn is_watched(&self, path: &Path) -> bool {
        self.stamps.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_watch_counts_as_change() {
        let mut debouncer = ChangeDebouncer::default();
        let path = Path::new("/src/a.soy");

        assert!(debouncer.watch(path));
        assert!(!debouncer.watch(path));
        assert!(!debouncer.accept(path));

        tokio::time::advance(DEBOUNCE).await;
        assert!(debouncer.accept(path));
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_changes_within_threshold() {
        let mut debouncer = ChangeDebouncer::default();
        let path = Path::new("/src/a.soy");
        debouncer.watch(path);
        tokio::time::advance(Duration::from_millis(1500)).await;

        assert!(debouncer.accept(path));
        tokio::time::advance(Duration::from_millis(400)).await;
        assert!(!debouncer.accept(path));

        // a rejected change does not restamp
        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(debouncer.accept(path));
    }

    #[tokio::test(start_paused = true)]
    async fn test_paths_are_independent() {
        let mut debouncer = ChangeDebouncer::default();
        let a = Path::new("/src/a.soy");
        let b = Path::new("/src/b.soy");

        assert!(debouncer.accept(a));
        assert!(debouncer.accept(b));
        assert!(!debouncer.accept(a));
        assert_eq!(debouncer.len(), 2);
    }

    #[test]
    fn test_unwatched_path_accepted_once() {
        let mut debouncer = ChangeDebouncer::default();
        let path = Path::new("/src/new.soy");

        assert!(!debouncer.is_watched(path));
        assert!(debouncer.accept(path));
        assert!(debouncer.is_watched(path));
        assert!(!debouncer.accept(path));
    }
}
