//! Precompiled-output registry.
//!
//! Records which output directories already hold compiled artifacts, so a
//! second compiler instance pointed at the same directory can skip the
//! external compiler and load what is there.
//!
//! Markers are write-once and never expire. Nothing is hashed or compared:
//! whether a marker is trusted is decided by [`ReusePolicy`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use dashmap::DashSet;
use serde::{Deserialize, Serialize};

/// How an existing marker for the resolved output directory is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReusePolicy {
    /// Skip the external compile and load the existing artifacts.
    /// Callers must change the output directory when sources change.
    #[default]
    Trust,
    /// Always run the external compiler. The marker is still recorded.
    Recompile,
}

/// Process-wide set of output directories known to hold compiled artifacts.
#[derive(Debug, Default)]
pub struct PrecompiledRegistry {
    markers: DashSet<PathBuf>,
}

/// Registry shared by every instance that does not bring its own.
static GLOBAL_REGISTRY: LazyLock<Arc<PrecompiledRegistry>> =
    LazyLock::new(|| Arc::new(PrecompiledRegistry::new()));

impl PrecompiledRegistry {
    pub fn new() -> Self {
        Self {
            markers: DashSet::new(),
        }
    }

    /// The process-wide registry.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    pub fn has_marker(&self, dir: &Path) -> bool {
        self.markers.contains(&marker_key(dir))
    }

    pub fn set_marker(&self, dir: &Path) {
        self.markers.insert(marker_key(dir));
    }

    /// Whether the external compile for `dir` can be skipped under `policy`.
    pub fn should_reuse(&self, dir: &Path, policy: ReusePolicy) -> bool {
        policy == ReusePolicy::Trust && self.has_marker(dir)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

/// Markers are keyed by lexical absolute path; the directory may not exist yet.
fn marker_key(dir: &Path) -> PathBuf {
    std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf())
}
