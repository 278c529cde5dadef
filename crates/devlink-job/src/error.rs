//! Error types for device jobs.

use devlink_transport::TransportError;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for job operations.
pub type Result<T> = std::result::Result<T, ControllerError>;

/// Why a single step failed.
///
/// Cloneable so the same failure can be stored in the job state and handed
/// to listeners.
#[derive(Error, Debug, Clone)]
pub enum StepError {
    #[error(transparent)]
    Transport(Arc<TransportError>),

    #[error("{message}")]
    Failed { message: String },

    #[error("Step {index} finished without producing a result")]
    NoOutput { index: usize },

    #[error("Step timed out after {duration_ms} ms")]
    Timeout { duration_ms: u64 },

    #[error("Completion channel closed")]
    CompletionClosed,
}

impl StepError {
    /// Create a generic step failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

impl From<TransportError> for StepError {
    fn from(error: TransportError) -> Self {
        Self::Transport(Arc::new(error))
    }
}

/// A failed run: the step that failed and why.
#[derive(Error, Debug, Clone)]
#[error("Step {step_index} failed: {source}")]
pub struct JobError {
    pub step_index: usize,
    #[source]
    pub source: StepError,
}

impl JobError {
    pub fn new(step_index: usize, source: StepError) -> Self {
        Self { step_index, source }
    }
}

/// Errors returned by a [`JobHandle`](crate::JobHandle).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("Job controller has stopped")]
    Closed,
}
