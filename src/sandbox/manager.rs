//! Sandbox lookup and loading.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::debug;
use crate::error::LoadError;

use super::{EnvironmentFactory, LuaEnvironment, Sandbox, SandboxKey, Script, ScriptFile, Template};

/// Owns the sandboxes of one compiler instance, created on first use.
pub struct SandboxManager {
    sandboxes: Mutex<FxHashMap<SandboxKey, Arc<Mutex<Sandbox>>>>,
    factory: EnvironmentFactory,
}

impl Default for SandboxManager {
    fn default() -> Self {
        Self::new(Arc::new(LuaEnvironment::boxed))
    }
}

impl SandboxManager {
    pub fn new(factory: EnvironmentFactory) -> Self {
        Self {
            sandboxes: Mutex::new(FxHashMap::default()),
            factory,
        }
    }

    /// Sandbox for `key`, creating it if needed.
    pub fn sandbox(&self, key: &SandboxKey) -> Result<Arc<Mutex<Sandbox>>, LoadError> {
        let mut sandboxes = self.sandboxes.lock();
        if let Some(sandbox) = sandboxes.get(key) {
            return Ok(Arc::clone(sandbox));
        }

        let env = (self.factory)().map_err(|err| LoadError::Runtime {
            key: key.to_string(),
            message: err.0,
        })?;
        let sandbox = Arc::new(Mutex::new(Sandbox::new(key.clone(), env)));
        sandboxes.insert(key.clone(), Arc::clone(&sandbox));
        debug!("sandbox"; "created {}", key);
        Ok(sandbox)
    }

    /// Read `context` and `files` from disk, then load them into `key`'s sandbox.
    ///
    /// Reads run concurrently; evaluation runs on the blocking pool under the
    /// sandbox lock, in the order given.
    pub async fn load_files(
        &self,
        key: &SandboxKey,
        context: &[PathBuf],
        files: &[ScriptFile],
    ) -> Result<(), LoadError> {
        let context: Vec<_> = context.iter().cloned().map(ScriptFile::new).collect();
        let context = read_all(&context).await?;
        let artifacts = read_all(files).await?;
        let sandbox = self.sandbox(key)?;

        let count = artifacts.len();
        tokio::task::spawn_blocking(move || sandbox.lock().load(&context, artifacts))
            .await
            .map_err(|err| LoadError::Interrupted(err.to_string()))??;

        debug!("sandbox"; "loaded {} artifacts into {}", count, key);
        Ok(())
    }

    /// Resolve `name` in an existing sandbox. Never creates one.
    pub fn get(&self, key: &SandboxKey, name: &str) -> Option<Arc<dyn Template>> {
        let sandbox = self.sandboxes.lock().get(key).cloned()?;
        sandbox.lock().get(name)
    }

    pub fn keys(&self) -> Vec<SandboxKey> {
        let mut keys: Vec<_> = self.sandboxes.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Read every file concurrently, keeping the input order.
async fn read_all(files: &[ScriptFile]) -> Result<Vec<Script>, LoadError> {
    let handles: Vec<_> = files
        .iter()
        .cloned()
        .map(|ScriptFile { key, path }| {
            tokio::spawn(async move {
                match tokio::fs::read_to_string(&path).await {
                    Ok(source) => Ok(Script { key, path, source }),
                    Err(err) => Err(LoadError::Read(path, err)),
                }
            })
        })
        .collect();

    let mut scripts = Vec::with_capacity(handles.len());
    for handle in handles {
        let script = handle
            .await
            .map_err(|err| LoadError::Interrupted(err.to_string()))??;
        scripts.push(script);
    }
    Ok(scripts)
}
