//! Error types for the job lifecycle.
//!
//! Library surfaces use `thiserror` enums; the binary wraps them with `anyhow`.

use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by a [`JobStateStore`](crate::JobStateStore) backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateStoreError {
    /// The backing key-value store could not be reached or rejected the command.
    #[error("state store unavailable during {operation}: {message}")]
    Unavailable {
        /// Store operation that failed (for example `insert_new`).
        operation: &'static str,
        /// Underlying driver message.
        message: String,
    },
    /// A record already exists under this job id.
    #[error("job record {job_id} already exists")]
    Duplicate {
        /// Colliding job id.
        job_id: String,
    },
    /// A persisted record could not be encoded or decoded.
    #[error("corrupt job record {job_id}: {message}")]
    Corrupt {
        /// Job id of the record.
        job_id: String,
        /// Serialization error text.
        message: String,
    },
}

impl StateStoreError {
    pub(crate) fn unavailable(operation: &'static str, error: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            operation,
            message: error.to_string(),
        }
    }
}

/// Failure of the external converter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// The converter ran and reported failure.
    #[error("Conversion failed: {message}")]
    Failed {
        /// Diagnostic text from the converter.
        message: String,
    },
    /// The converter did not finish within the configured bound.
    #[error("Conversion timed out after {timeout_secs}s")]
    TimedOut {
        /// Configured timeout.
        timeout_secs: u64,
    },
    /// The converter process could not be started.
    #[error("Conversion could not start: {message}")]
    Launch {
        /// Spawn error text.
        message: String,
    },
}

impl ConversionError {
    /// Build a [`ConversionError::Failed`] from any message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Transport-neutral error class, used to pick a response code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobErrorKind {
    /// Infrastructure failure (state store, artifact store).
    ServerError,
    /// The conversion failed or timed out.
    ConversionFailure,
    /// Job never existed or has expired.
    NotFound,
    /// Job exists but its state does not allow the request.
    Conflict,
}

/// Errors surfaced by [`JobLifecycleManager`](crate::JobLifecycleManager).
#[derive(Error, Debug)]
pub enum JobError {
    /// The key-value store cannot be reached.
    #[error("state store unavailable: {0}")]
    StateStoreUnavailable(String),

    /// A stored job record could not be decoded.
    #[error("corrupt job record {job_id}: {message}")]
    CorruptRecord {
        /// Job id of the record.
        job_id: String,
        /// Decode error text.
        message: String,
    },

    /// The converter failed; the job has been recorded as `failed`.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Job never existed or has expired.
    #[error("Job not found or expired: {job_id}")]
    NotFound {
        /// Requested job id.
        job_id: String,
    },

    /// Job is `completed` but its output artifact is gone.
    #[error("Converted file not found for job {job_id}: {}", path.display())]
    ArtifactMissing {
        /// Job id.
        job_id: String,
        /// Expected output path.
        path: PathBuf,
    },

    /// Job is not in `completed` state.
    #[error("Cannot download: job status is {status}")]
    NotCompleted {
        /// Job id.
        job_id: String,
        /// Current status label.
        status: &'static str,
    },

    /// Job already reached a terminal state.
    #[error("job {job_id} is already {status}")]
    InvalidTransition {
        /// Job id.
        job_id: String,
        /// Current terminal status label.
        status: &'static str,
    },

    /// Filesystem failure while touching an artifact.
    #[error("artifact store error at {}: {source}", path.display())]
    ArtifactStore {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl JobError {
    /// Classify this error for a transport layer.
    pub fn kind(&self) -> JobErrorKind {
        match self {
            Self::StateStoreUnavailable(_)
            | Self::CorruptRecord { .. }
            | Self::ArtifactStore { .. } => JobErrorKind::ServerError,
            Self::Conversion(_) => JobErrorKind::ConversionFailure,
            Self::NotFound { .. } => JobErrorKind::NotFound,
            Self::ArtifactMissing { .. }
            | Self::NotCompleted { .. }
            | Self::InvalidTransition { .. } => JobErrorKind::Conflict,
        }
    }

    pub(crate) fn not_found(job_id: impl Into<String>) -> Self {
        Self::NotFound {
            job_id: job_id.into(),
        }
    }
}

impl From<StateStoreError> for JobError {
    fn from(error: StateStoreError) -> Self {
        match error {
            StateStoreError::Unavailable { .. } | StateStoreError::Duplicate { .. } => {
                Self::StateStoreUnavailable(error.to_string())
            }
            StateStoreError::Corrupt { job_id, message } => Self::CorruptRecord { job_id, message },
        }
    }
}
