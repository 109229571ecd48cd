//! Tool abstraction.
//!
//! A [`Tool`] is one processing capability (filter, measurement, reader).
//! A [`ToolNode`] is a named, configured instance of a tool inside a
//! Procedure. Parameters arrive as a JSON object and are decoded once into
//! the tool's own typed schema during `initialize`.

use crate::context::EngineContext;
use crate::data::{ImageData, ResultData};
use crate::graph::error::{ConfigurationError, ToolConfigError, ToolError};
use crate::graph::port::{find_port, PortDescriptor, PortDirection, PortKind, IMAGE_TOOL_PORTS};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw tool parameters as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolParams(Map<String, Value>);

impl ToolParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from any JSON value; `null` is an empty set, non-objects are rejected.
    pub fn from_value(value: Value) -> Result<Self, ToolConfigError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(ToolConfigError::InvalidParameters(format!(
                "expected an object, got {}",
                other
            ))),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode into a typed parameter struct.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ToolConfigError> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|e| ToolConfigError::InvalidParameters(e.to_string()))
    }
}

/// What a tool hands back from `run`.
#[derive(Debug, Default)]
pub struct ToolOutput {
    pub image: Option<ImageData>,
    pub results: ResultData,
}

impl ToolOutput {
    pub fn new(image: Option<ImageData>, results: ResultData) -> Self {
        Self { image, results }
    }

    /// Image only, no results.
    pub fn image(image: Option<ImageData>) -> Self {
        Self {
            image,
            results: ResultData::new(),
        }
    }
}

/// A processing capability that can be placed in a Procedure.
#[cfg_attr(test, mockall::automock)]
pub trait Tool: Send {
    /// Ports this tool exposes. Fixed for the lifetime of the instance.
    fn ports(&self) -> Vec<PortDescriptor> {
        IMAGE_TOOL_PORTS.to_vec()
    }

    /// Validate and apply parameters. Called once when the node is created
    /// and again on every parameter change.
    fn initialize(
        &mut self,
        params: &ToolParams,
        ctx: &EngineContext,
    ) -> Result<(), ToolConfigError>;

    /// Whether the executor must skip this tool when no image reaches it.
    /// Sources return `false`; everything that reads pixels returns `true`.
    fn requires_image_input(&self) -> bool;

    /// Process one input. The image is owned by the tool for the call.
    fn run(
        &mut self,
        input: Option<ImageData>,
        upstream: ResultData,
    ) -> Result<ToolOutput, ToolError>;
}

/// A named, configured tool instance inside a Procedure.
pub struct ToolNode {
    name: String,
    tool_type: String,
    tool: Box<dyn Tool>,
    params: ToolParams,
    ports: Vec<PortDescriptor>,
    requires_image: bool,
    enabled: bool,
}

impl ToolNode {
    /// Create and initialize a node.
    pub fn new(
        name: impl Into<String>,
        tool_type: impl Into<String>,
        mut tool: Box<dyn Tool>,
        params: ToolParams,
        ctx: &EngineContext,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        tool.initialize(&params, ctx)
            .map_err(|e| ConfigurationError::InvalidParameters {
                tool: name.clone(),
                message: e.to_string(),
            })?;

        let ports = tool.ports();
        let requires_image = tool.requires_image_input();

        Ok(Self {
            name,
            tool_type: tool_type.into(),
            tool,
            params,
            ports,
            requires_image,
            enabled: true,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tool_type(&self) -> &str {
        &self.tool_type
    }

    pub fn params(&self) -> &ToolParams {
        &self.params
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    pub fn port(&self, name: &str, direction: PortDirection) -> Option<&PortDescriptor> {
        find_port(&self.ports, name, direction)
    }

    /// Whether the tool declares any image output.
    pub fn has_image_output(&self) -> bool {
        self.ports
            .iter()
            .any(|p| p.direction == PortDirection::Output && p.kind == PortKind::Image)
    }

    /// Whether the tool declares any image input.
    pub fn has_image_input(&self) -> bool {
        self.ports
            .iter()
            .any(|p| p.direction == PortDirection::Input && p.kind == PortKind::Image)
    }

    pub fn requires_image_input(&self) -> bool {
        self.requires_image
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Re-initialize with new parameters. Old parameters stay on failure.
    pub fn reconfigure(
        &mut self,
        params: ToolParams,
        ctx: &EngineContext,
    ) -> Result<(), ConfigurationError> {
        if let Err(e) = self.tool.initialize(&params, ctx) {
            // Put the tool back into its previous configuration
            let _ = self.tool.initialize(&self.params, ctx);
            return Err(ConfigurationError::InvalidParameters {
                tool: self.name.clone(),
                message: e.to_string(),
            });
        }
        self.params = params;
        Ok(())
    }

    pub(crate) fn execute(
        &mut self,
        input: Option<ImageData>,
        upstream: ResultData,
    ) -> Result<ToolOutput, ToolError> {
        self.tool.run(input, upstream)
    }
}

impl std::fmt::Debug for ToolNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolNode")
            .field("name", &self.name)
            .field("tool_type", &self.tool_type)
            .field("enabled", &self.enabled)
            .field("params", &self.params)
            .finish()
    }
}
