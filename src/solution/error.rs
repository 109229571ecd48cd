//! Solution-specific error types.

use crate::graph::ConfigurationError;
use crate::pipeline::PipelineError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolutionError {
    #[error("Procedure '{0}' already exists")]
    DuplicateProcedure(String),

    #[error("Unknown procedure '{0}'")]
    UnknownProcedure(String),

    /// Direct runs and graph changes wait until the pipeline is stopped
    #[error("Pipeline is running; stop it first")]
    PipelineActive,

    #[error("Pipeline mode is not enabled")]
    PipelineNotEnabled,

    /// Continuous runs and pipeline mode exclude each other
    #[error("Pipeline mode is enabled; disable it first")]
    PipelineModeEnabled,

    #[error("Continuous run is active; stop it first")]
    ContinuousActive,

    /// A detached worker still holds the procedure
    #[error("Procedure '{0}' is still in use")]
    ProcedureInUse(String),

    #[error("Solution has no procedures")]
    NoProcedures,

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}
