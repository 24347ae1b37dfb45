//! Compile notifications.
//!
//! Every compile, initial or scheduled, publishes one [`CompileEvent`] on the
//! instance's broadcast channel. Watch mode attaches a listener that turns
//! them into status blocks.

use std::path::PathBuf;

use tokio::sync::broadcast;

use crate::logger::{status_error, status_success};

/// Capacity of the event channel. Slow subscribers skip old events.
pub const EVENT_CAPACITY: usize = 64;

/// What a finished compile produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileSummary {
    /// Number of source files in the job.
    pub files: usize,
    /// Directory the artifacts were written to. `None` when there was nothing to compile.
    pub output_dir: Option<PathBuf>,
    /// Existing artifacts were loaded instead of running the compiler.
    pub reused: bool,
    /// Scheduled recompile of changed files rather than a full compile.
    pub incremental: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileEvent {
    Compiled(CompileSummary),
    Failed { message: String },
}

/// Log each event as a watch status block until the channel closes.
pub fn spawn_log_listener(mut rx: broadcast::Receiver<CompileEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &CompileEvent) {
    match event {
        CompileEvent::Compiled(summary) => status_success(&describe(summary)),
        CompileEvent::Failed { message } => status_error("compile failed", message),
    }
}

fn describe(summary: &CompileSummary) -> String {
    let noun = if summary.files == 1 { "template" } else { "templates" };
    match (summary.reused, summary.incremental) {
        (true, _) => format!("loaded {} precompiled {noun}", summary.files),
        (false, true) => format!("recompiled {} {noun}", summary.files),
        (false, false) => format!("compiled {} {noun}", summary.files),
    }
}
