//! Run-level error types.
//!
//! Stages surface typed errors upward; the run coordinator catches them and
//! records a final [`RunStatus`]. Ingest failures are the one non-fatal kind:
//! the offending source is skipped with a logged warning and the run proceeds.

use thiserror::Error;

use crate::staging::StagingError;

/// Errors surfaced by a discovery run.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Missing, unknown, or out-of-range configuration - fatal before any
    /// stage runs.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A source is unreachable or refused authentication. Non-fatal: the
    /// source is skipped and the run proceeds on the remaining sources.
    #[error("ingest error for source '{uri}': {message}")]
    Ingest { uri: String, message: String },

    /// Failure to read or write the staging store - fatal to the current run.
    #[error(transparent)]
    Staging(#[from] StagingError),

    /// A data-model invariant was violated during processing - fatal; the
    /// run is marked aborted.
    #[error("internal assertion failed: {0}")]
    Internal(String),

    /// The run was cancelled between stages or outer loop iterations.
    #[error("run cancelled")]
    Cancelled,
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Final status of a discovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Finished,
    Aborted,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Finished => "finished",
            RunStatus::Aborted => "aborted",
        }
    }
}
