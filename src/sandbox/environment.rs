//! The execution environment seam.
//!
//! A [`Sandbox`](super::Sandbox) drives an [`Environment`] through its
//! lifecycle; the environment owns the interpreter state. The shipped
//! implementation is [`LuaEnvironment`](super::LuaEnvironment).

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

/// Failure reported by the interpreter, with its message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ScriptError(pub String);

impl From<mlua::Error> for ScriptError {
    fn from(err: mlua::Error) -> Self {
        Self(err.to_string())
    }
}

/// Isolated interpreter state for one sandbox.
pub trait Environment: Send {
    /// Evaluate the runtime support layer. Called once per environment.
    fn load_runtime(&mut self) -> Result<(), ScriptError>;

    /// Clear the runtime's global registries without reloading it.
    fn reset_registries(&mut self) -> Result<(), ScriptError>;

    /// Evaluate one script. `name` is used in error messages.
    fn evaluate(&mut self, name: &str, source: &str) -> Result<(), ScriptError>;

    /// Look up a callable by dotted name, e.g. `mail.letters.formletter`.
    fn resolve(&self, name: &str) -> Option<Arc<dyn Template>>;
}

/// A resolved template function.
pub trait Template: Send + Sync {
    /// Call with `(data, nil, injected)` and coerce the result to a string.
    fn call(&self, data: &Value, injected: &Value) -> Result<String, ScriptError>;
}

/// Creates the environment of a newly needed sandbox.
pub type EnvironmentFactory =
    Arc<dyn Fn() -> Result<Box<dyn Environment>, ScriptError> + Send + Sync>;
