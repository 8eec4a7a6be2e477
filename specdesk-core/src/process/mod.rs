//! Process runner for external commands.
//!
//! Every higher-level operation (probing, installing, listing capabilities,
//! invoking OpenSpec) launches its child process through the
//! [`ProcessRunner`] trait. The runner streams each complete output line to an
//! optional [`LineSender`] while the process runs, then returns the terminal
//! [`OperationOutcome`].
//!
//! # Architecture
//!
//! - `runner`: the tokio-backed [`SystemProcessRunner`]
//! - `testing`: a scripted runner for unit tests (test builds only)

pub mod runner;
#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::timeout;

pub use runner::SystemProcessRunner;

// =============================================================================
// Streams and Lines
// =============================================================================

/// Which output stream of a child process a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    /// Standard output.
    Out,
    /// Standard error.
    Err,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Out => write!(f, "stdout"),
            Self::Err => write!(f, "stderr"),
        }
    }
}

/// A single line produced by a running process, before it is tagged with an
/// operation identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamLine {
    pub stream: OutputStream,
    pub text: String,
}

impl StreamLine {
    pub fn out(text: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Out,
            text: text.into(),
        }
    }

    pub fn err(text: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Err,
            text: text.into(),
        }
    }
}

/// Sender half of a line stream. The runner drops it when the process exits.
pub type LineSender = mpsc::UnboundedSender<StreamLine>;

/// Receiver half of a line stream.
pub type LineReceiver = mpsc::UnboundedReceiver<StreamLine>;

/// Create a channel for streaming process lines.
pub fn line_channel() -> (LineSender, LineReceiver) {
    mpsc::unbounded_channel()
}

// =============================================================================
// Command Specification
// =============================================================================

/// A command to launch: program, arguments and optional working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Program and arguments joined with single spaces.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command_line())
    }
}

// =============================================================================
// Outcomes and Errors
// =============================================================================

/// Terminal summary of a completed process.
///
/// A process terminated by a signal reports exit code `-1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl OperationOutcome {
    /// Returns true if the process exited with code zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The external process could not be started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaunchError {
    #[error("Executable not found: {program}")]
    NotFound { program: String },
    #[error("Permission denied launching {program}")]
    PermissionDenied { program: String },
    #[error("Failed to launch {program}: {message}")]
    Io { program: String, message: String },
}

impl LaunchError {
    /// Classifies a spawn failure.
    pub fn from_io(program: &str, err: &std::io::Error) -> Self {
        let program = program.to_string();
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { program },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { program },
            _ => Self::Io {
                program,
                message: err.to_string(),
            },
        }
    }
}

// =============================================================================
// Runner Trait
// =============================================================================

/// Launches external processes and streams their output.
///
/// Implementations must deliver each line to `lines` as soon as it is read,
/// preserve per-stream order, and drop `lines` once the process has exited.
/// A launch failure is reported before any line is delivered. The child is
/// never killed on behalf of the caller.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        command: CommandSpec,
        lines: Option<LineSender>,
    ) -> Result<OperationOutcome, LaunchError>;
}

/// Result of a time-bounded run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundedRun {
    Completed(OperationOutcome),
    LaunchFailed(LaunchError),
    TimedOut,
}

/// Runs a command without line streaming, giving up after `limit`.
///
/// Used for short gating checks (probe, detect, listing) where a hung child
/// must not stall the caller.
pub async fn run_bounded(
    runner: &dyn ProcessRunner,
    command: CommandSpec,
    limit: Duration,
) -> BoundedRun {
    match timeout(limit, runner.run(command, None)).await {
        Ok(Ok(outcome)) => BoundedRun::Completed(outcome),
        Ok(Err(e)) => BoundedRun::LaunchFailed(e),
        Err(_) => BoundedRun::TimedOut,
    }
}
