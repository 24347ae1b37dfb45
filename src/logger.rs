//! Terminal logging.
//!
//! Everything here writes to stderr, so rendered output on stdout stays
//! clean when piped.
//!
//! - `log!` prints a line with a colored `[module]` prefix
//! - `debug!` does the same, only with `--verbose`
//! - [`status_success`]/[`status_error`] redraw one status block in watch mode
//!
//! ```ignore
//! log!("compile"; "compiling {} files", count);
//! debug!("sandbox"; "reloading {}", key);
//! status_error("compile failed", &diagnostics);
//! ```

use std::io::{Write, stderr};
use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};

use crossterm::{
    cursor, queue,
    terminal::{Clear, ClearType},
};
use owo_colors::OwoColorize;
use parking_lot::Mutex;

static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Enable `debug!` output (set from `--verbose`).
pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::Relaxed);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

/// Log a message with a colored module prefix.
///
/// ```ignore
/// log!("watch"; "recompiling templates due to change in {}", file.display());
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Like `log!`, but only printed in verbose mode.
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

pub fn log(module: &str, message: &str) {
    let prefix = prefix(module);
    let mut err = stderr().lock();
    queue!(err, Clear(ClearType::UntilNewLine)).ok();
    writeln!(err, "{prefix} {message}").ok();
    err.flush().ok();
}

fn prefix(module: &str) -> String {
    let tag = format!("[{module}]");
    match module.to_ascii_lowercase().as_str() {
        "compile" => tag.bright_blue().bold().to_string(),
        "sandbox" => tag.bright_cyan().bold().to_string(),
        "watch" => tag.bright_green().bold().to_string(),
        "warning" => tag.bright_magenta().bold().to_string(),
        "error" => tag.bright_red().bold().to_string(),
        _ => tag.bright_yellow().bold().to_string(),
    }
}

// ============================================================================
// watch status
// ============================================================================

/// Status block that replaces itself on every update, so a long-running
/// watch shows only the outcome of the latest compile.
#[derive(Debug, Default)]
pub struct StatusBlock {
    /// Terminal lines taken by the block currently on screen.
    height: usize,
}

static STATUS: LazyLock<Mutex<StatusBlock>> = LazyLock::new(|| Mutex::new(StatusBlock::default()));

impl StatusBlock {
    pub fn success(&mut self, message: &str) {
        self.redraw(&"✓".green().to_string(), message);
    }

    pub fn error(&mut self, summary: &str, detail: &str) {
        let message = match detail {
            "" => summary.to_string(),
            detail => format!("{summary}\n{detail}"),
        };
        self.redraw(&"✗".red().to_string(), &message);
    }

    fn redraw(&mut self, symbol: &str, message: &str) {
        let mut err = stderr().lock();
        if let Ok(up) = u16::try_from(self.height)
            && up > 0
        {
            queue!(err, cursor::MoveUp(up), Clear(ClearType::FromCursorDown)).ok();
        }

        let time = chrono::Local::now().format("%H:%M:%S").to_string();
        writeln!(err, "{} {symbol} {message}", format!("[{time}]").dimmed()).ok();
        err.flush().ok();

        self.height = height(message);
    }
}

fn height(message: &str) -> usize {
    message.lines().count().max(1)
}

/// Show a success line in the shared status block.
pub fn status_success(message: &str) {
    STATUS.lock().success(message);
}

/// Show an error, with optional detail lines, in the shared status block.
pub fn status_error(summary: &str, detail: &str) {
    STATUS.lock().error(summary, detail);
}
