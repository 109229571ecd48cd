//! Tool graph: ports, tools, connections and the Procedure executor.
//!
//! Graph mutations are validated synchronously and recompile the cached
//! execution plan. Execution itself lives in [`Procedure::run`].

pub mod compiled_plan;
pub mod compiler;
pub mod connection;
pub mod definition;
pub mod error;
pub mod id;
pub mod port;
pub mod procedure;
pub mod registry;
pub mod tool;
pub mod tool_type;
pub mod tools;

pub use compiled_plan::{CompiledPlan, PlanStats};
pub use connection::Connection;
pub use definition::{GraphDefinition, NodeDefinition};
pub use error::{ConfigurationError, ToolConfigError, ToolError, ToolExecutionError};
pub use id::NodeId;
pub use port::{PortDescriptor, PortDirection, PortKind};
pub use procedure::{Procedure, ProcedureRun};
pub use registry::ToolRegistry;
pub use tool::{Tool, ToolNode, ToolOutput, ToolParams};
pub use tool_type::BuiltinTool;
