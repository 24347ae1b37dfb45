//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("config file parsing error")]
    Toml(#[from] toml::de::Error),

    #[error("config serialization error")]
    Serialize(#[from] toml::ser::Error),

    #[error("unrecognized configuration key `{0}`")]
    UnknownKey(String),

    #[error("config validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_config_error_display() {
        let io_err = ConfigError::Io(
            PathBuf::from("templet.toml"),
            Error::new(ErrorKind::NotFound, "file not found"),
        );
        let display = format!("{io_err}");
        assert!(display.contains("IO error"));
        assert!(display.contains("templet.toml"));

        let unknown = ConfigError::UnknownKey("tmpdir".to_string());
        assert_eq!(unknown.to_string(), "unrecognized configuration key `tmpdir`");
    }
}
