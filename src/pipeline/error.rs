//! Pipeline-specific error types.

use thiserror::Error;

/// Errors surfaced by the staged pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Pipeline has no stages")]
    NoStages,

    #[error("Pipeline is already running")]
    AlreadyRunning,

    #[error("Pipeline was stopped and cannot be restarted")]
    AlreadyStopped,

    #[error("Pipeline not active")]
    NotActive,

    /// A stage processor panicked; the whole pipeline stopped
    #[error("Stage '{stage}' failed: {message}")]
    StageFailed { stage: String, message: String },

    #[error("Timed out waiting on queue '{0}'")]
    QueueTimeout(String),

    #[error("Failed to spawn worker for stage '{stage}': {message}")]
    Spawn { stage: String, message: String },
}

/// Per-item failure reported by a stage processor.
///
/// Recorded on the item's bundle; the item still moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct StageError(pub String);

impl StageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
