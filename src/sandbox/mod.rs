//! Locale-scoped sandboxes.
//!
//! # Module Structure
//!
//! - `environment` - `Environment`/`Template` traits
//! - `lua` - embedded Lua environment and its support layer
//! - `manager` - lazy creation and async loading of sandboxes by key
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ──load──▶ Ready ──load──▶ Ready ──load──▶ ...
//!       │                   │
//!       └ runtime layer     └ registries reset, cache cleared
//! ```
//!
//! Each load merges new artifacts into the sandbox's ledger and evaluates the
//! context scripts followed by the full ledger, in order.

mod environment;
mod lua;
mod manager;


pub use environment::{Environment, EnvironmentFactory, ScriptError, Template};
pub use lua::LuaEnvironment;
pub use manager::SandboxManager;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::LoadError;

/// Identifies a sandbox: one per configured locale, or the default one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SandboxKey {
    Default,
    Locale(String),
}

impl SandboxKey {
    /// Key serving `locale`. Unknown or missing locales map to the default.
    pub fn for_locale(locale: Option<&str>, configured: &[String]) -> Self {
        match locale {
            Some(locale) if configured.iter().any(|l| l == locale) => {
                Self::Locale(locale.to_string())
            }
            _ => Self::Default,
        }
    }

    /// Keys that a compile loads into.
    pub fn for_config(configured: &[String]) -> Vec<Self> {
        if configured.is_empty() {
            vec![Self::Default]
        } else {
            configured.iter().cloned().map(Self::Locale).collect()
        }
    }

    pub fn locale(&self) -> Option<&str> {
        match self {
            Self::Default => None,
            Self::Locale(locale) => Some(locale),
        }
    }
}

impl fmt::Display for SandboxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Locale(locale) => f.write_str(locale),
        }
    }
}

/// A script file to load, and the ledger key it replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFile {
    pub key: PathBuf,
    pub path: PathBuf,
}

impl ScriptFile {
    /// Keyed by its own path.
    pub fn new(path: PathBuf) -> Self {
        Self {
            key: path.clone(),
            path,
        }
    }

    /// Keyed by `key`, e.g. the artifact path relative to its output dir,
    /// so a recompile into a fresh directory replaces the earlier entry.
    pub fn keyed(key: PathBuf, path: PathBuf) -> Self {
        Self { key, path }
    }
}

/// A script read from disk, ready for evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub key: PathBuf,
    pub path: PathBuf,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    Uninitialized,
    Ready,
}

/// One isolated environment with its artifact ledger and function cache.
pub struct Sandbox {
    key: SandboxKey,
    env: Box<dyn Environment>,
    runtime_loaded: bool,
    ledger: Vec<Script>,
    cache: FxHashMap<String, Arc<dyn Template>>,
}

impl Sandbox {
    pub fn new(key: SandboxKey, env: Box<dyn Environment>) -> Self {
        Self {
            key,
            env,
            runtime_loaded: false,
            ledger: Vec::new(),
            cache: FxHashMap::default(),
        }
    }

    pub fn key(&self) -> &SandboxKey {
        &self.key
    }

    pub fn state(&self) -> SandboxState {
        if self.runtime_loaded {
            SandboxState::Ready
        } else {
            SandboxState::Uninitialized
        }
    }

    /// Load `artifacts` after `context` scripts.
    ///
    /// Artifacts replace ledger entries with the same key and append
    /// otherwise. The ledger is committed only when every script evaluates;
    /// on failure the environment is rebuilt from the previous ledger, so it
    /// keeps serving what it served before. Either way the cache ends up empty.
    pub fn load(&mut self, context: &[Script], artifacts: Vec<Script>) -> Result<(), LoadError> {
        if self.runtime_loaded {
            self.env.reset_registries().map_err(|e| self.runtime_error(e))?;
        } else {
            self.env.load_runtime().map_err(|e| self.runtime_error(e))?;
            self.runtime_loaded = true;
        }
        self.cache.clear();

        let mut ledger = self.ledger.clone();
        for script in artifacts {
            match ledger.iter_mut().find(|s| s.key == script.key) {
                Some(existing) => *existing = script,
                None => ledger.push(script),
            }
        }

        if let Err(err) = evaluate_all(self.env.as_mut(), context, &ledger) {
            self.restore(context);
            return Err(err);
        }

        self.ledger = ledger;
        Ok(())
    }

    /// Re-evaluate the committed ledger after a failed load.
    fn restore(&mut self, context: &[Script]) {
        let restored = match self.env.reset_registries() {
            Ok(()) => evaluate_all(self.env.as_mut(), context, &self.ledger),
            Err(err) => Err(self.runtime_error(err)),
        };

        if let Err(err) = restored {
            crate::log!("warning"; "sandbox {} could not restore its last good state: {}", self.key, err);
        }
    }

    fn runtime_error(&self, err: ScriptError) -> LoadError {
        LoadError::Runtime {
            key: self.key.to_string(),
            message: err.0,
        }
    }

    /// Resolve `name`, caching the callable until the next load.
    pub fn get(&mut self, name: &str) -> Option<Arc<dyn Template>> {
        if let Some(template) = self.cache.get(name) {
            return Some(Arc::clone(template));
        }
        let template = self.env.resolve(name)?;
        self.cache.insert(name.to_string(), Arc::clone(&template));
        Some(template)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    pub fn ledger_len(&self) -> usize {
        self.ledger.len()
    }
}

/// Evaluate `context` then `ledger`, stopping at the first failure.
fn evaluate_all(
    env: &mut dyn Environment,
    context: &[Script],
    ledger: &[Script],
) -> Result<(), LoadError> {
    for script in context.iter().chain(ledger) {
        let name = script.path.to_string_lossy();
        env.evaluate(&name, &script.source)
            .map_err(|err| LoadError::Evaluate {
                path: script.path.clone(),
                message: err.0,
            })?;
    }
    Ok(())
}
