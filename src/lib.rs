//! Templet - compile declarative templates with an external compiler and
//! serve them from per-locale sandboxes.
//!
//! # Module Structure
//!
//! ```text
//! src/
//! ├── config     # CompilerConfig (templet.toml, option merging)
//! ├── compiler   # external compiler invocation and output layout
//! ├── sandbox    # per-locale script environments
//! ├── scheduler  # debounced, serialized recompilation
//! ├── instance   # TemplateCompiler, the public entry point
//! ├── registry   # precompiled-output markers shared across instances
//! ├── events     # compile notifications
//! ├── error      # error types
//! └── logger     # colored terminal output
//! ```

pub mod logger;

pub mod compiler;
pub mod config;
pub mod error;
pub mod events;
pub mod instance;
pub mod registry;
pub mod sandbox;
pub mod scheduler;

pub use compiler::{CompilerBackend, ProcessBackend};
pub use config::{CompilerConfig, ConfigError, ToolConfig};
pub use error::{CompileError, Error, LoadError, ResolutionError, Result};
pub use events::{CompileEvent, CompileSummary};
pub use instance::{RecompileHandle, TemplateCompiler, TemplateCompilerBuilder};
pub use registry::{PrecompiledRegistry, ReusePolicy};
pub use sandbox::{SandboxKey, Template};
