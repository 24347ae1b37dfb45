//! `[compiler]` section configuration.
//!
//! Describes how the external template compiler is launched.
//!
//! # Example
//!
//! ```toml
//! [compiler]
//! program = "java"
//! jar = "/opt/soy/SoyToJsSrcCompiler.jar"
//! entry_point = "com.google.template.soy.SoyToJsSrcCompiler"
//! timeout_secs = 120
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// External compiler invocation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Executable that runs the compiler.
    pub program: String,

    /// Compiler archive, always the first classpath entry.
    pub jar: PathBuf,

    /// Class containing the compiler entry point.
    pub entry_point: String,

    /// Kill the compiler when it runs longer than this.
    /// - unset (default): wait indefinitely
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ToolConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program: "java".to_string(),
            jar: PathBuf::from("SoyToJsSrcCompiler.jar"),
            entry_point: "com.google.template.soy.SoyToJsSrcCompiler".to_string(),
            timeout_secs: None,
        }
    }
}
