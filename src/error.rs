//! Error types.
//!
//! Each stage fails with its own error: compiling (`CompileError`), loading
//! artifacts into a sandbox (`LoadError`), resolving a template name
//! (`ResolutionError`) and configuration (`ConfigError`). [`Error`] wraps
//! them for the public API.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub use crate::config::ConfigError;

/// Result alias for the public API.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to discover sources in `{0}`")]
    Discover(PathBuf, #[source] std::io::Error),

    #[error("failed to watch sources")]
    Watch(#[from] notify::Error),

    #[error("template `{name}` failed to render: {message}")]
    Render { name: String, message: String },
}

/// The external compiler did not produce output.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("template compiler `{program}` not found")]
    ToolNotFound {
        program: String,
        #[source]
        source: which::Error,
    },

    #[error("failed to run `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("template compile failed ({status}):\n{diagnostics}")]
    Failed { status: String, diagnostics: String },

    #[error("template compiler timed out after {}s:\n{diagnostics}", timeout.as_secs())]
    TimedOut {
        timeout: Duration,
        diagnostics: String,
    },

    #[error("compile task was interrupted: {0}")]
    Interrupted(String),
}

/// Artifacts could not be loaded into a sandbox.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read `{0}`")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("failed to evaluate `{path}`: {message}")]
    Evaluate { path: PathBuf, message: String },

    #[error("failed to initialize sandbox `{key}`: {message}")]
    Runtime { key: String, message: String },

    #[error("load task was interrupted: {0}")]
    Interrupted(String),
}

/// A template name could not be turned into a callable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("cannot load template, set `load_compiled_templates = true`")]
    LoadingDisabled,

    #[error("unknown template `{0}`")]
    Unknown(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_carries_diagnostics() {
        let err = CompileError::Failed {
            status: "exit status: 1".to_string(),
            diagnostics: "In file a.soy:3: unclosed tag".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("exit status: 1"));
        assert!(display.contains("unclosed tag"));
    }

    #[test]
    fn test_wrapped_errors_are_transparent() {
        let err: Error = ResolutionError::Unknown("missing.template".to_string()).into();
        assert_eq!(err.to_string(), "unknown template `missing.template`");
        assert!(matches!(err, Error::Resolution(ResolutionError::Unknown(_))));
    }
}
