//! Compiler configuration management for `templet.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── compiler   # [compiler] section (external tool invocation)
//! ├── error      # ConfigError
//! └── mod.rs     # CompilerConfig (this file)
//! ```
//!
//! # Example
//!
//! ```toml
//! output_dir = "build/templates"
//! unique_dir = false
//! locales = ["en", "fr"]
//! message_file_path_format = "i18n/{LOCALE}.xlf"
//! allow_dynamic_recompile = true
//!
//! [compiler]
//! jar = "/opt/soy/SoyToJsSrcCompiler.jar"
//! ```
//!
//! Every key is optional. Unknown keys are rejected, both when loading a file
//! and when merging options into a live configuration.

pub mod compiler;
mod error;

pub use compiler::ToolConfig;
pub use error::ConfigError;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::registry::ReusePolicy;

// ============================================================================
// root configuration
// ============================================================================

/// Options of one compiler instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Output root used when `output_dir` is unset.
    pub tmp_dir: PathBuf,

    /// Working directory of the compiler for `compile_template_files`.
    /// Compiling a whole directory uses that directory instead.
    pub input_dir: PathBuf,

    /// Output root for compiled artifacts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    /// Place each compile in its own timestamped directory.
    pub unique_dir: bool,

    /// Watch compiled sources and recompile them on change.
    pub allow_dynamic_recompile: bool,

    /// Load artifacts into sandboxes after compiling.
    /// When `false`, templates cannot be resolved or rendered.
    pub load_compiled_templates: bool,

    /// Delete the output directory once its artifacts are loaded.
    pub erase_temporary_files: bool,

    /// Emit provide/require declarations for template namespaces.
    pub use_closure_style: bool,

    /// How `css` commands are compiled: `literal`, `reference` or `goog`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub css_handling_scheme: Option<String>,

    /// Extra classpath entries, e.g. for compiler plugins.
    pub classpath: Vec<String>,

    /// Plugin module class names passed to the compiler.
    pub plugin_modules: Vec<String>,

    /// Scripts evaluated in every sandbox before the compiled artifacts.
    pub context_scripts: Vec<PathBuf>,

    /// Join the artifacts of each locale into a single file.
    pub concat_output: bool,

    /// Base name of the concatenated artifact.
    pub concat_file_name: String,

    /// Locales to compile for. Empty means a single default sandbox.
    pub locales: Vec<String>,

    /// Translation file pattern, may contain `{LOCALE}` and friends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_file_path_format: Option<String>,

    /// When `false`, generated code assumes top-level namespaces already exist.
    pub should_declare_top_level_namespaces: bool,

    /// What to do when an output directory is already marked as compiled.
    pub precompiled_reuse: ReusePolicy,

    /// External compiler invocation.
    pub compiler: ToolConfig,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            tmp_dir: std::env::temp_dir().join("templet"),
            input_dir: std::env::current_dir().unwrap_or_default(),
            output_dir: None,
            unique_dir: true,
            allow_dynamic_recompile: false,
            load_compiled_templates: true,
            erase_temporary_files: false,
            use_closure_style: false,
            css_handling_scheme: None,
            classpath: Vec::new(),
            plugin_modules: Vec::new(),
            context_scripts: Vec::new(),
            concat_output: false,
            concat_file_name: "compiled".to_string(),
            locales: Vec::new(),
            message_file_path_format: None,
            should_declare_top_level_namespaces: true,
            precompiled_reuse: ReusePolicy::default(),
            compiler: ToolConfig::default(),
        }
    }
}

impl CompilerConfig {
    /// Parse configuration from a TOML string.
    ///
    /// Relative paths are resolved against the current directory.
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let base = std::env::current_dir().unwrap_or_default();
        Self::parse(content, &base)
    }

    /// Load configuration from a file.
    ///
    /// Relative paths are resolved against the file's directory.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::parse(&content, &base)
    }

    fn parse(content: &str, base: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::parse_with_ignored(toml::Deserializer::new(content))?;
        config.normalize_paths(base);
        config.validate()?;
        Ok(config)
    }

    /// Deserialize, failing on the first key no field accepted.
    fn parse_with_ignored<'de, D>(deserializer: D) -> Result<Self, ConfigError>
    where
        D: serde::Deserializer<'de, Error = toml::de::Error>,
    {
        let mut ignored = Vec::new();
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;

        match ignored.into_iter().next() {
            Some(key) => Err(ConfigError::UnknownKey(key)),
            None => Ok(config),
        }
    }

    /// Merge a set of options into this configuration.
    ///
    /// Nested tables merge key by key; any other value replaces the current
    /// one. On error the configuration is left untouched.
    pub fn merge(&mut self, options: toml::Table) -> Result<(), ConfigError> {
        let toml::Value::Table(mut current) = toml::Value::try_from(&*self)? else {
            return Err(ConfigError::Validation(
                "configuration did not serialize to a table".to_string(),
            ));
        };
        merge_tables(&mut current, options);

        let mut merged = Self::parse_with_ignored(toml::Value::Table(current))?;
        merged.normalize_paths(&std::env::current_dir().unwrap_or_default());
        merged.validate()?;

        *self = merged;
        Ok(())
    }

    /// Set a single option by dotted key, e.g. `compiler.timeout_secs`.
    pub fn set_option(
        &mut self,
        key: &str,
        value: impl Into<toml::Value>,
    ) -> Result<(), ConfigError> {
        let mut segments = key.rsplit('.');
        let mut table = toml::Table::new();
        table.insert(
            segments.next().unwrap_or_default().to_string(),
            value.into(),
        );
        for segment in segments {
            let mut outer = toml::Table::new();
            outer.insert(segment.to_string(), toml::Value::Table(table));
            table = outer;
        }
        self.merge(table)
    }

    /// Output root before any unique segment is appended.
    pub fn output_root(&self) -> &Path {
        self.output_dir.as_deref().unwrap_or(&self.tmp_dir)
    }

    /// Whether artifacts carry a locale suffix.
    pub fn is_multi_locale(&self) -> bool {
        self.locales.len() > 1
    }

    /// Make every configured path absolute.
    fn normalize_paths(&mut self, base: &Path) {
        self.tmp_dir = resolve(&self.tmp_dir, base);
        self.input_dir = resolve(&self.input_dir, base);
        if let Some(dir) = &self.output_dir {
            self.output_dir = Some(resolve(dir, base));
        }
        self.context_scripts = self
            .context_scripts
            .iter()
            .map(|path| resolve(path, base))
            .collect();
        self.compiler.jar = resolve(&self.compiler.jar, base);
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.concat_file_name.is_empty() {
            return Err(ConfigError::Validation(
                "`concat_file_name` must not be empty".to_string(),
            ));
        }
        if let Some(locale) = self
            .locales
            .iter()
            .find(|locale| locale.is_empty() || locale.contains(['/', '\\', ',']))
        {
            return Err(ConfigError::Validation(format!(
                "invalid locale `{locale}` in `locales`"
            )));
        }
        if self.compiler.program.is_empty() {
            return Err(ConfigError::Validation(
                "`compiler.program` must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Recursively merge `overlay` into `base`.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(nested)) => {
                merge_tables(existing, nested);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Expand `~` and make `path` absolute relative to `base`.
fn resolve(path: &Path, base: &Path) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref());
    let joined = if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    };
    std::path::absolute(&joined).unwrap_or(joined)
}
