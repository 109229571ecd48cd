//! Error handling for VisChain-RS
//!
//! Each area owns a focused error enum (`ConfigurationError` for graph
//! mutation, `PipelineError` for the staged pipeline, `SolutionError` for the
//! orchestrator). `VisionError` wraps all of them for callers that just want
//! one type, together with a Result alias and context helpers.

use crate::graph::ConfigurationError;
use crate::pipeline::PipelineError;
use crate::solution::SolutionError;
use thiserror::Error;

/// Main error type for VisChain-RS operations
#[derive(Error, Debug)]
pub enum VisionError {
    /// Graph construction or mutation was rejected
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Staged pipeline errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Solution orchestration errors
    #[error("Solution error: {0}")]
    Solution(#[from] SolutionError),

    /// Errors related to engine configuration loading/saving
    #[error("Engine config error: {0}")]
    Config(String),

    /// Timeout errors
    #[error("Timeout: {0}")]
    Timeout(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<VisionError>,
    },
}

impl VisionError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        VisionError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

impl From<serde_json::Error> for VisionError {
    fn from(err: serde_json::Error) -> Self {
        VisionError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for VisionError {
    fn from(err: toml::de::Error) -> Self {
        VisionError::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for VisionError {
    fn from(err: toml::ser::Error) -> Self {
        VisionError::Serialization(err.to_string())
    }
}

/// Result type alias for VisChain-RS operations
pub type Result<T> = std::result::Result<T, VisionError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<VisionError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}
