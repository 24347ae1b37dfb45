//! External command execution.
//!
//! A builder for running the template compiler: stdout and stderr are
//! captured, an optional timeout kills the process, and a non-zero exit
//! becomes [`CompileError::Failed`] carrying stderr as diagnostics.
//!
//! ```ignore
//! let output = Cmd::new("java")
//!     .args(["-classpath", "soy.jar", "..."])
//!     .cwd(input_dir)
//!     .timeout(Some(Duration::from_secs(60)))
//!     .run()?;
//! ```

use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::debug;
use crate::error::CompileError;

/// Poll interval while waiting on a process with a timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Command builder for the external compiler.
#[derive(Debug, Default)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl Cmd {
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            ..Default::default()
        }
    }

    /// Add a single argument. Empty arguments are dropped.
    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        let arg = arg.as_ref();
        if !arg.is_empty() {
            self.args.push(arg.to_owned());
        }
        self
    }

    /// Add multiple arguments. Empty arguments are dropped.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    pub fn cwd<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.cwd = Some(dir.as_ref().to_owned());
        self
    }

    /// Kill the process if it runs longer than `timeout`.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run to completion and return the captured output.
    pub fn run(self) -> Result<Output, CompileError> {
        let name = self.program_name();
        let resolved = which::which(&self.program).map_err(|source| CompileError::ToolNotFound {
            program: name.clone(),
            source,
        })?;

        let mut cmd = Command::new(&resolved);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        debug!("exec"; "{} {}", name, self.args_display());

        let mut child = cmd.spawn().map_err(|source| CompileError::Spawn {
            program: name.clone(),
            source,
        })?;

        // Drain both pipes so a chatty compiler cannot block on a full buffer.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = wait(&mut child, self.timeout).map_err(|source| CompileError::Spawn {
            program: name.clone(),
            source,
        })?;

        let output = Output {
            status: status.unwrap_or_default(),
            stdout: join(stdout),
            stderr: join(stderr),
        };

        match (status, self.timeout) {
            (None, Some(timeout)) => Err(CompileError::TimedOut {
                timeout,
                diagnostics: diagnostics(&output),
            }),
            (Some(status), _) if !status.success() => Err(CompileError::Failed {
                status: status.to_string(),
                diagnostics: diagnostics(&output),
            }),
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stderr.trim().is_empty() {
                    debug!("exec"; "{}", stderr.trim());
                }
                Ok(output)
            }
        }
    }

    fn program_name(&self) -> String {
        self.program.to_string_lossy().to_string()
    }

    fn args_display(&self) -> String {
        self.args
            .iter()
            .map(|arg| arg.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Wait for `child`, killing it once `timeout` elapses.
///
/// Returns `None` when the process was killed.
fn wait(child: &mut Child, timeout: Option<Duration>) -> std::io::Result<Option<ExitStatus>> {
    let Some(timeout) = timeout else {
        return child.wait().map(Some);
    };

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            child.kill()?;
            child.wait()?;
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn join(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Diagnostics of a failed run: stderr, or stdout when stderr is empty.
fn diagnostics(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        return stderr.trim().to_string();
    }
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}
