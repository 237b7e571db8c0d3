/// Shared error taxonomy for the substrate.
///
/// Callers branch on kind: `Stopped` and `Timeout` are deliberate-shutdown
/// and deadline conditions whose cleanup already happened by the time they
/// propagate; `ProcessFailure` is a diagnosable child failure; the rest are
/// operator-facing setup problems.
use std::fmt;
use std::time::Duration;

use nix::sys::signal::Signal;
use thiserror::Error;

use crate::exec::{ExitKind, ProcessOutcome};

#[derive(Error, Debug)]
pub enum ProfboxError {
    /// The caller's stop signal was observed while waiting. The supervised
    /// child (if any) was terminated and reaped before this was raised.
    #[error("stopped by the shutdown signal")]
    Stopped,

    /// Deadline exceeded. Same cleanup guarantee as `Stopped`.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    ProcessFailure(#[from] ProcessFailure),

    #[error("namespace error: {0}")]
    Namespace(String),

    #[error("privilege error: {0}")]
    Privilege(String),

    #[error("lock error: {0}")]
    Lock(String),

    #[error("the program {0:?} is missing, please install it")]
    ProgramMissing(String),

    #[error("process error: {0}")]
    Process(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for substrate operations.
pub type Result<T> = std::result::Result<T, ProfboxError>;

/// A supervised child exited non-zero or died on a signal while the caller
/// required success. Carries everything needed for postmortem diagnosis.
#[derive(Debug, Clone)]
pub struct ProcessFailure {
    pub argv: Vec<String>,
    pub status: ExitKind,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl From<ProcessOutcome> for ProcessFailure {
    fn from(outcome: ProcessOutcome) -> Self {
        Self {
            argv: outcome.argv,
            status: outcome.status,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
        }
    }
}

impl fmt::Display for ProcessFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cmd = self.argv.join(" ");
        match self.status {
            ExitKind::Signaled(signo) => match Signal::try_from(signo) {
                Ok(sig) => write!(f, "Command '{}' died with {}.", cmd, sig.as_str())?,
                Err(_) => write!(f, "Command '{}' died with unknown signal {}.", cmd, signo)?,
            },
            ExitKind::Exited(code) => {
                write!(f, "Command '{}' returned non-zero exit status {}.", cmd, code)?
            }
        }
        write!(
            f,
            "\nstdout: {}\nstderr: {}",
            String::from_utf8_lossy(&self.stdout),
            String::from_utf8_lossy(&self.stderr)
        )
    }
}

impl std::error::Error for ProcessFailure {}
