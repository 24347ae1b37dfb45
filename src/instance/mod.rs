//! Compiler instances.
//!
//! A [`TemplateCompiler`] owns one configuration scope: its sandboxes, its
//! recompile scheduler and, when dynamic recompilation is on, a watch over
//! one input directory. Handles are cheap to clone.
//!
//! ```ignore
//! let compiler = TemplateCompiler::new(CompilerConfig::from_path("templet.toml".as_ref())?);
//! compiler.compile_templates("templates").await?;
//! let html = compiler.render("mail.formletter", &data, &Value::Null, Some("en"))?;
//! ```


use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::compiler::discover::find_files;
use crate::compiler::output::{
    self, COMPILED_SUFFIX, SOURCE_EXTENSION, artifact_path, concat_artifacts, resolve_output_dir,
};
use crate::compiler::{CompileJob, CompilerBackend, ProcessBackend};
use crate::config::CompilerConfig;
use crate::error::{CompileError, Error, LoadError, ResolutionError, Result};
use crate::events::{CompileEvent, CompileSummary, EVENT_CAPACITY, spawn_log_listener};
use crate::registry::PrecompiledRegistry;
use crate::sandbox::{EnvironmentFactory, SandboxKey, SandboxManager, ScriptFile, Template};
use crate::scheduler::{RecompileScheduler, SourceWatcher};
use crate::{debug, log};

/// Scheduled recompile; `None` when there was nothing left to compile.
pub type RecompileHandle = JoinHandle<Option<Result<CompileSummary>>>;

/// Compiles template sources and serves renders from per-locale sandboxes.
#[derive(Clone)]
pub struct TemplateCompiler {
    inner: Arc<Inner>,
}

pub struct TemplateCompilerBuilder {
    config: CompilerConfig,
    registry: Option<Arc<PrecompiledRegistry>>,
    backend: Option<Arc<dyn CompilerBackend>>,
    environment: Option<EnvironmentFactory>,
    external_watcher: bool,
}

impl TemplateCompilerBuilder {
    /// Share precompiled markers through `registry` instead of the global one.
    pub fn with_registry(mut self, registry: Arc<PrecompiledRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Produce artifacts with `backend` instead of running the external compiler.
    pub fn with_backend(mut self, backend: Arc<dyn CompilerBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Create sandbox environments with `factory` instead of Lua states.
    pub fn with_environment(mut self, factory: EnvironmentFactory) -> Self {
        self.environment = Some(factory);
        self
    }

    /// Do not start a filesystem watcher; the host reports changes through
    /// [`TemplateCompiler::on_file_changed`].
    pub fn external_watcher(mut self, external: bool) -> Self {
        self.external_watcher = external;
        self
    }

    pub fn build(self) -> TemplateCompiler {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let sandboxes = match self.environment {
            Some(factory) => SandboxManager::new(factory),
            None => SandboxManager::default(),
        };

        TemplateCompiler {
            inner: Arc::new(Inner {
                config: ArcSwap::from_pointee(self.config),
                sandboxes,
                scheduler: Arc::new(RecompileScheduler::new()),
                registry: self.registry.unwrap_or_else(PrecompiledRegistry::global),
                backend: self.backend.unwrap_or_else(|| Arc::new(ProcessBackend)),
                events,
                watch: Mutex::new(WatchState::default()),
                external_watcher: self.external_watcher,
            }),
        }
    }
}

struct Inner {
    config: ArcSwap<CompilerConfig>,
    sandboxes: SandboxManager,
    scheduler: Arc<RecompileScheduler>,
    registry: Arc<PrecompiledRegistry>,
    backend: Arc<dyn CompilerBackend>,
    events: broadcast::Sender<CompileEvent>,
    watch: Mutex<WatchState>,
    external_watcher: bool,
}

/// Watch over a single input directory.
#[derive(Default)]
struct WatchState {
    input_dir: Option<PathBuf>,
    watcher: Option<SourceWatcher>,
    listener: bool,
}

impl TemplateCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: CompilerConfig) -> TemplateCompilerBuilder {
        TemplateCompilerBuilder {
            config,
            registry: None,
            backend: None,
            environment: None,
            external_watcher: false,
        }
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<CompilerConfig> {
        self.inner.config.load_full()
    }

    /// Merge options into the configuration. Unknown keys are rejected.
    ///
    /// Takes effect for the next compile.
    pub fn set_options(&self, options: toml::Table) -> Result<()> {
        let mut next = CompilerConfig::clone(&self.config());
        next.merge(options)?;
        self.inner.config.store(Arc::new(next));
        Ok(())
    }

    /// Set one option by dotted key, e.g. `compiler.timeout_secs`.
    pub fn set_option(&self, key: &str, value: impl Into<toml::Value>) -> Result<()> {
        let mut next = CompilerConfig::clone(&self.config());
        next.set_option(key, value)?;
        self.inner.config.store(Arc::new(next));
        Ok(())
    }

    /// Receive an event after every compile, initial or scheduled.
    pub fn subscribe(&self) -> broadcast::Receiver<CompileEvent> {
        self.inner.events.subscribe()
    }

    /// Compile every source under `input_dir` and load the results.
    pub async fn compile_templates(&self, input_dir: impl AsRef<Path>) -> Result<CompileSummary> {
        let input_dir = absolute(input_dir.as_ref());
        let search = input_dir.clone();
        let files = tokio::task::spawn_blocking(move || find_files(&search, SOURCE_EXTENSION))
            .await
            .map_err(|err| CompileError::Interrupted(err.to_string()))?
            .map_err(|err| Error::Discover(input_dir.clone(), err))?;

        self.compile_in(input_dir, files).await
    }

    /// Compile `files`, relative to the configured `input_dir`, and load the results.
    pub async fn compile_template_files(&self, files: &[PathBuf]) -> Result<CompileSummary> {
        let input_dir = self.config().input_dir.clone();
        self.compile_in(input_dir, files.to_vec()).await
    }

    async fn compile_in(&self, input_dir: PathBuf, files: Vec<PathBuf>) -> Result<CompileSummary> {
        let config = self.config();

        if files.is_empty() {
            let result = Ok(CompileSummary {
                files: 0,
                output_dir: None,
                reused: false,
                incremental: false,
            });
            self.inner.publish(&result);
            return result;
        }

        if config.allow_dynamic_recompile {
            self.watch_sources(&input_dir, &files)?;
        }

        let inner = &self.inner;
        let result = inner
            .scheduler
            .run_exclusive(inner.run_job(&input_dir, files, &config, false))
            .await;
        inner.publish(&result);
        result
    }

    /// Load every `*.soy.lua` artifact under `dir` into the default sandbox.
    pub async fn load_compiled_templates(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref().to_path_buf();
        let search = dir.clone();
        let files = tokio::task::spawn_blocking(move || find_files(&search, COMPILED_SUFFIX))
            .await
            .map_err(|err| LoadError::Interrupted(err.to_string()))?
            .map_err(|err| Error::Discover(dir.clone(), err))?;

        let files: Vec<_> = files.into_iter().map(|file| dir.join(file)).collect();
        self.load_compiled_template_files(&files, None).await
    }

    /// Load artifacts into the sandbox serving `locale`.
    pub async fn load_compiled_template_files(
        &self,
        files: &[PathBuf],
        locale: Option<&str>,
    ) -> Result<()> {
        let config = self.config();
        let key = SandboxKey::for_locale(locale, &config.locales);
        let scripts: Vec<_> = files.iter().cloned().map(ScriptFile::new).collect();

        self.inner
            .sandboxes
            .load_files(&key, &config.context_scripts, &scripts)
            .await?;
        Ok(())
    }

    /// Resolve a template by dotted name in the sandbox serving `locale`.
    pub fn get(
        &self,
        name: &str,
        locale: Option<&str>,
    ) -> Result<Arc<dyn Template>, ResolutionError> {
        let config = self.config();
        if !config.load_compiled_templates {
            return Err(ResolutionError::LoadingDisabled);
        }

        let key = SandboxKey::for_locale(locale, &config.locales);
        self.inner
            .sandboxes
            .get(&key, name)
            .ok_or_else(|| ResolutionError::Unknown(name.to_string()))
    }

    /// Render `name` with `data` and `injected` data.
    pub fn render(
        &self,
        name: &str,
        data: &Value,
        injected: &Value,
        locale: Option<&str>,
    ) -> Result<String> {
        let template = self.get(name, locale)?;
        template.call(data, injected).map_err(|err| Error::Render {
            name: name.to_string(),
            message: err.0,
        })
    }

    /// Report a change to a source file.
    ///
    /// Returns the scheduled recompile when the change was accepted. The
    /// handle resolves to `None` if an earlier job already picked the file up.
    /// Changes outside the watched input directory, to non-sources, or
    /// within the debounce window of the previous accepted change are
    /// ignored. Must be called within a tokio runtime.
    pub fn on_file_changed(&self, path: &Path) -> Option<RecompileHandle> {
        let (path, file) = self.inner.watched_source(path)?;
        if !self.inner.scheduler.accept_change(&path) {
            debug!("watch"; "ignoring change in {}", file.display());
            return None;
        }

        log!("watch"; "recompiling templates due to change in {}", file.display());
        self.inner.scheduler.mark_dirty(file);

        let inner = Arc::clone(&self.inner);
        Some(
            self.inner
                .scheduler
                .schedule(move |files| async move { inner.recompile(files).await }),
        )
    }

    /// Register `files` for debouncing and start watching `input_dir`.
    fn watch_sources(&self, input_dir: &Path, files: &[PathBuf]) -> Result<()> {
        let mut watch = self.inner.watch.lock();
        if let Some(dir) = &watch.input_dir
            && dir != input_dir
        {
            log!("warning"; "already watching {}, not watching {}", dir.display(), input_dir.display());
            return Ok(());
        }

        for file in files {
            self.inner.scheduler.watch(&input_dir.join(file));
        }
        watch.input_dir = Some(input_dir.to_path_buf());

        if !self.inner.external_watcher && watch.watcher.is_none() {
            let weak = Arc::downgrade(&self.inner);
            watch.watcher = Some(SourceWatcher::spawn(input_dir, move |path| {
                forward_change(&weak, &path);
            })?);
        }
        if !watch.listener {
            spawn_log_listener(self.inner.events.subscribe());
            watch.listener = true;
        }
        Ok(())
    }
}

/// Deliver a watcher notification if the instance is still alive.
fn forward_change(inner: &Weak<Inner>, path: &Path) {
    if let Some(inner) = inner.upgrade() {
        let _ = TemplateCompiler { inner }.on_file_changed(path);
    }
}

impl Inner {
    /// Compile `files` and load the artifacts into every configured sandbox.
    ///
    /// A full compile may reuse a marked output directory. A scheduled
    /// recompile always runs the compiler.
    async fn run_job(
        &self,
        input_dir: &Path,
        files: Vec<PathBuf>,
        config: &Arc<CompilerConfig>,
        incremental: bool,
    ) -> Result<CompileSummary> {
        let output_dir = resolve_output_dir(config, Utc::now());
        let reused = !incremental && self.registry.should_reuse(&output_dir, config.precompiled_reuse);

        if reused {
            debug!("compile"; "reusing precompiled output in {}", output_dir.display());
        } else {
            let job = CompileJob {
                input_dir: input_dir.to_path_buf(),
                files: files.clone(),
                output_dir: output_dir.clone(),
                locales: config.locales.clone(),
            };
            debug!("compile"; "compiling {} files into {}", files.len(), output_dir.display());

            let backend = Arc::clone(&self.backend);
            let job_config = Arc::clone(config);
            tokio::task::spawn_blocking(move || backend.compile(&job, &job_config))
                .await
                .map_err(|err| CompileError::Interrupted(err.to_string()))??;

            // erased or partial output cannot be reused
            if !incremental && !config.erase_temporary_files {
                self.registry.set_marker(&output_dir);
            }
        }

        self.load_outputs(&output_dir, &files, config, incremental)
            .await?;

        if config.erase_temporary_files
            && let Err(err) = output::erase(&output_dir).await
        {
            log!("warning"; "failed to delete {}: {}", output_dir.display(), err);
        }

        Ok(CompileSummary {
            files: files.len(),
            output_dir: Some(output_dir),
            reused,
            incremental,
        })
    }

    async fn load_outputs(
        &self,
        output_dir: &Path,
        files: &[PathBuf],
        config: &CompilerConfig,
        incremental: bool,
    ) -> Result<()> {
        let multi_locale = config.is_multi_locale();

        for key in SandboxKey::for_config(&config.locales) {
            let locale = if multi_locale { key.locale() } else { None };
            let artifacts: Vec<_> = files
                .iter()
                .map(|file| {
                    ScriptFile::keyed(
                        artifact_path(Path::new(""), file, locale),
                        artifact_path(output_dir, file, locale),
                    )
                })
                .collect();

            // a recompile only has the changed files, so it keeps the last full concat
            if config.concat_output && !incremental {
                let paths: Vec<_> = artifacts.iter().map(|a| a.path.clone()).collect();
                let dir = output_dir.to_path_buf();
                let name = config.concat_file_name.clone();
                let locale = locale.map(str::to_string);
                let concat = tokio::task::spawn_blocking(move || {
                    concat_artifacts(&dir, &paths, &name, locale.as_deref())
                })
                .await;
                match concat {
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => log!("warning"; "error concatenating files: {}", err),
                    Err(err) => log!("warning"; "concatenation task failed: {}", err),
                }
            }

            if config.load_compiled_templates {
                self.sandboxes
                    .load_files(&key, &config.context_scripts, &artifacts)
                    .await?;
            }
        }
        Ok(())
    }

    /// Scheduled recompile of the dirty snapshot.
    async fn recompile(&self, files: Vec<PathBuf>) -> Result<CompileSummary> {
        let config = self.config.load_full();
        let input_dir = self
            .watch
            .lock()
            .input_dir
            .clone()
            .unwrap_or_else(|| config.input_dir.clone());

        let result = self.run_job(&input_dir, files, &config, true).await;
        self.publish(&result);
        result
    }

    /// Absolute path and input-relative source path of a watched change.
    fn watched_source(&self, path: &Path) -> Option<(PathBuf, PathBuf)> {
        let watch = self.watch.lock();
        let dir = watch.input_dir.as_ref()?;

        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            dir.join(path)
        };
        let file = path.strip_prefix(dir).ok()?.to_path_buf();
        let is_source = file.extension().and_then(|e| e.to_str()) == Some(SOURCE_EXTENSION);
        is_source.then_some((path, file))
    }

    fn publish(&self, result: &Result<CompileSummary>) {
        let event = match result {
            Ok(summary) => CompileEvent::Compiled(summary.clone()),
            Err(err) => CompileEvent::Failed {
                message: error_chain(err),
            },
        };
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Error message followed by its sources.
fn error_chain(err: &Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
