//! External template compilation.
//!
//! # Module Structure
//!
//! - `args` - argument list for the external compiler
//! - `backend` - `CompilerBackend` trait and the subprocess implementation
//! - `discover` - source and artifact discovery
//! - `exec` - subprocess runner with stderr capture and timeout
//! - `output` - output directory and artifact path layout

pub mod args;
pub mod backend;
pub mod discover;
pub mod exec;
pub mod output;

use std::path::PathBuf;

pub use backend::{CompilerBackend, ProcessBackend};

/// One unit of scheduled compile work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileJob {
    /// Working directory of the compiler; `files` are relative to it.
    pub input_dir: PathBuf,
    /// Full discovered list, or the dirty subset on recompile.
    pub files: Vec<PathBuf>,
    /// Resolved output directory for this job.
    pub output_dir: PathBuf,
    /// Locales to compile for. Empty means no localization.
    pub locales: Vec<String>,
}

impl CompileJob {
    pub fn is_multi_locale(&self) -> bool {
        self.locales.len() > 1
    }
}
