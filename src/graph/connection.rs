use crate::graph::id::{EdgeId, NodeId};
use crate::graph::port::{PortKind, INPUT_IMAGE, OUTPUT_IMAGE};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Directed edge `(from_tool, from_port) -> (to_tool, to_port)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub from_tool: String,
    #[serde(default = "default_from_port")]
    pub from_port: String,
    pub to_tool: String,
    #[serde(default = "default_to_port")]
    pub to_port: String,
}

fn default_from_port() -> String {
    OUTPUT_IMAGE.to_string()
}

fn default_to_port() -> String {
    INPUT_IMAGE.to_string()
}

impl Connection {
    pub fn new(
        from_tool: impl Into<String>,
        from_port: impl Into<String>,
        to_tool: impl Into<String>,
        to_port: impl Into<String>,
    ) -> Self {
        Self {
            from_tool: from_tool.into(),
            from_port: from_port.into(),
            to_tool: to_tool.into(),
            to_port: to_port.into(),
        }
    }

    /// `OutputImage -> InputImage` between two tools.
    pub fn image(from_tool: impl Into<String>, to_tool: impl Into<String>) -> Self {
        Self::new(from_tool, OUTPUT_IMAGE, to_tool, INPUT_IMAGE)
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.from_tool, self.from_port, self.to_tool, self.to_port
        )
    }
}

/// A validated connection resolved to node ids.
#[derive(Debug, Clone)]
pub struct Edge {
    pub id: EdgeId,
    pub from_node: NodeId,
    pub to_node: NodeId,
    pub kind: PortKind,
    pub connection: Connection,
}
