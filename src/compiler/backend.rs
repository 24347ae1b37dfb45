//! Compiler backends.
//!
//! [`CompilerBackend`] turns a [`CompileJob`] into artifacts on disk. The
//! shipped [`ProcessBackend`] runs the external compiler; tests substitute an
//! in-process backend.

use crate::config::CompilerConfig;
use crate::error::CompileError;

use super::CompileJob;
use super::args::build_args;
use super::exec::Cmd;

/// Produces compiled artifacts for a job.
///
/// Called on the blocking pool; implementations may block.
pub trait CompilerBackend: Send + Sync {
    fn compile(&self, job: &CompileJob, config: &CompilerConfig) -> Result<(), CompileError>;
}

/// Runs `config.compiler.program` as a subprocess in the job's input directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessBackend;

impl CompilerBackend for ProcessBackend {
    fn compile(&self, job: &CompileJob, config: &CompilerConfig) -> Result<(), CompileError> {
        std::fs::create_dir_all(&job.output_dir).map_err(|source| CompileError::Spawn {
            program: config.compiler.program.clone(),
            source,
        })?;

        Cmd::new(&config.compiler.program)
            .args(build_args(job, config))
            .cwd(&job.input_dir)
            .timeout(config.compiler.timeout())
            .run()
            .map(|_| ())
    }
}
