//! External process execution

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;

use crate::{PipelineError, PipelineResult};

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` when killed by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Turn a non-zero exit into [`PipelineError::ToolFailed`]
    pub fn check(self, tool: &str) -> PipelineResult<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(PipelineError::ToolFailed {
                tool: tool.to_string(),
                status: self.status,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs external programs to completion
pub trait ProcessRunner {
    /// Run `program` with `args`, capturing both output streams
    ///
    /// A program that cannot be started yields
    /// [`PipelineError::ToolNotFound`]; a non-zero exit is reported through
    /// [`ProcessOutput::status`], not as an error.
    fn run(&self, program: &Path, args: &[OsString]) -> PipelineResult<ProcessOutput>;
}

/// [`ProcessRunner`] backed by `std::process::Command`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, program: &Path, args: &[OsString]) -> PipelineResult<ProcessOutput> {
        tracing::debug!(program = %program.display(), ?args, "Running external tool");

        let output = Command::new(program).args(args).output().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                PipelineError::ToolNotFound(program.to_path_buf())
            } else {
                PipelineError::Io(e)
            }
        })?;

        Ok(ProcessOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Render a command line for log output
pub fn display_command(program: &Path, args: &[OsString]) -> String {
    std::iter::once(program.as_os_str())
        .chain(args.iter().map(|a| a.as_os_str()))
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}
