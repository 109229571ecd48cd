//! Graph-specific error types.

use thiserror::Error;

/// Rejected graph construction or mutation.
///
/// Returned synchronously; the graph is left unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Tool '{0}' already exists")]
    DuplicateTool(String),

    #[error("Unknown tool '{0}'")]
    UnknownTool(String),

    #[error("Tool '{tool}' has no {direction} port '{port}'")]
    UnknownPort {
        tool: String,
        port: String,
        direction: &'static str,
    },

    #[error("Cannot connect {from} to {to}: port kinds differ")]
    PortKindMismatch { from: String, to: String },

    #[error("Image input {0} is already connected")]
    InputAlreadyConnected(String),

    #[error("Cannot connect tool '{0}' to itself")]
    SelfLoop(String),

    #[error("Connecting '{from}' to '{to}' would create a cycle")]
    CycleDetected { from: String, to: String },

    #[error("Connection {0} already exists")]
    DuplicateConnection(String),

    #[error("Invalid parameters for tool '{tool}': {message}")]
    InvalidParameters { tool: String, message: String },

    #[error("Unknown tool type '{0}'")]
    UnknownToolType(String),
}

/// Failure of a tool's `run`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Failed(String),
}

/// Failure of a tool's `initialize`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolConfigError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Missing service: {0}")]
    MissingService(&'static str),
}

/// A tool failure recorded during a Procedure run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Tool '{tool}' failed: {error}")]
pub struct ToolExecutionError {
    pub tool: String,
    pub error: ToolError,
}
