//! External tool invocation.
//!
//! Every render, extract, convert and OCR command goes through the
//! [`ToolRunner`] trait, so each external collaborator can be swapped for a
//! test double that writes the expected files without any real binary.
//!
//! ## Outcome mapping
//!
//! | Situation | Result |
//! |-----------|--------|
//! | Binary not on `PATH` | `Err(JobError::ToolUnavailable)` |
//! | Non-zero exit status | `Err(JobError::ToolExecutionFailure)` with the stderr tail |
//! | Exit 0 | `Ok(ToolOutput)` with captured stdout / stderr |
//!
//! A zero exit status does not guarantee the tool wrote anything; callers
//! confirm their artefacts with [`expect_artifact`].

use crate::error::JobError;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Longest stderr excerpt kept in a failure detail.
const MAX_DETAIL_CHARS: usize = 240;

/// A fully specified command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<OsString>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Arguments rendered lossily, for logs and test assertions.
    pub fn arg_strings(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for a in &self.args {
            write!(f, " {}", a.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Captured output of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external commands. Blocking; call it from worker threads.
pub trait ToolRunner: Send + Sync {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, JobError>;
}

/// [`ToolRunner`] backed by [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemToolRunner;

impl ToolRunner for SystemToolRunner {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, JobError> {
        debug!("exec: {}", invocation);
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    JobError::ToolUnavailable {
                        tool: invocation.program.clone(),
                    }
                } else {
                    JobError::ToolExecutionFailure {
                        tool: invocation.program.clone(),
                        detail: e.to_string(),
                    }
                }
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(JobError::ToolExecutionFailure {
                tool: invocation.program.clone(),
                detail: format!("{}: {}", output.status, tail(&stderr)),
            });
        }

        Ok(ToolOutput { stdout, stderr })
    }
}

/// Confirm that a tool left a file of more than `min_bytes` at `path`.
pub fn expect_artifact(tool: &str, path: &Path, min_bytes: u64) -> Result<PathBuf, JobError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > min_bytes => Ok(path.to_path_buf()),
        _ => Err(JobError::MissingOutput {
            tool: tool.to_string(),
            path: path.to_path_buf(),
        }),
    }
}

/// Last [`MAX_DETAIL_CHARS`] characters of a trimmed message.
fn tail(s: &str) -> String {
    let s = s.trim();
    let count = s.chars().count();
    if count <= MAX_DETAIL_CHARS {
        s.to_string()
    } else {
        s.chars().skip(count - MAX_DETAIL_CHARS).collect()
    }
}
