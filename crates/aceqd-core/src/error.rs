//! Error types for correlation computations.

use std::fmt;
use std::path::PathBuf;

/// Result type alias for solver and correlation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the solver driver, the process-tensor cache and the
/// correlation aggregator.
#[derive(Debug)]
pub enum Error {
    /// The external solver process exited with a non-zero status.
    Solver {
        /// Tag of the owning job.
        tag: String,
        /// Exit code, if the process terminated normally.
        code: Option<i32>,
        /// Captured diagnostic output from the process's error stream.
        stderr: String,
    },
    /// The solver output file was missing or malformed after a reported-
    /// successful exit.
    Parse {
        /// Path of the offending output file.
        path: PathBuf,
        /// Human-readable description of what was wrong.
        reason: String,
    },
    /// The process-tensor precomputation failed before any parallel
    /// dispatch began.
    Artifact(Box<Error>),
    /// A per-time-point job failed. Carries the time index the job was
    /// dispatched for; reported only after every sibling job has finished.
    Job {
        /// Index into the time grid.
        index: usize,
        /// The underlying job failure.
        source: Box<Error>,
    },
    /// The t-grid step is not an integer multiple of the tau-grid step, so
    /// the auxiliary long run cannot be re-sampled onto the t grid.
    StepMismatch { dt: f64, dtau: f64 },
    /// A job's time series is too short to extract the requested delay
    /// window from.
    ShortSeries {
        /// Tag of the owning job.
        tag: String,
        /// Samples needed for the delay window.
        needed: usize,
        /// Samples actually present.
        got: usize,
    },
    /// IO error
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Solver { tag, code, stderr } => {
                let stderr = stderr.trim();
                match code {
                    Some(c) => write!(f, "solver job '{}' exited with status {}: {}", tag, c, stderr),
                    None => write!(f, "solver job '{}' was terminated by a signal: {}", tag, stderr),
                }
            }
            Error::Parse { path, reason } => {
                write!(f, "bad solver output {}: {}", path.display(), reason)
            }
            Error::Artifact(e) => write!(f, "process tensor build failed: {}", e),
            Error::Job { index, source } => {
                write!(f, "job for time index {} failed: {}", index, source)
            }
            Error::StepMismatch { dt, dtau } => {
                write!(f, "dt={} is not an integer multiple of dtau={}", dt, dtau)
            }
            Error::ShortSeries { tag, needed, got } => {
                write!(
                    f,
                    "job '{}' returned {} samples, need at least {} for the delay window",
                    tag, got, needed
                )
            }
            Error::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Artifact(e) | Error::Job { source: e, .. } => Some(e.as_ref()),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl Error {
    /// Index of the failing time point, if this error is job-attributed.
    pub fn job_index(&self) -> Option<usize> {
        match self {
            Error::Job { index, .. } => Some(*index),
            _ => None,
        }
    }
}
