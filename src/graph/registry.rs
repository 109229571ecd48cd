//! Tool factory registry.
//!
//! Maps a `tool_type` string to a constructor. Registries are plain values
//! handed to the loader, so two engines can expose different tool sets.

use crate::context::EngineContext;
use crate::graph::error::ConfigurationError;
use crate::graph::tool::{Tool, ToolNode, ToolParams};
use crate::graph::tool_type::BuiltinTool;
use std::collections::BTreeMap;

type ToolFactory = Box<dyn Fn() -> Box<dyn Tool> + Send + Sync>;

#[derive(Default)]
pub struct ToolRegistry {
    factories: BTreeMap<String, ToolFactory>,
}

impl ToolRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every [`BuiltinTool`]
    pub fn with_builtin_tools() -> Self {
        let mut registry = Self::new();
        for &tool in BuiltinTool::all() {
            registry.register(tool.type_name(), move || tool.create());
        }
        registry
    }

    /// Register a factory, replacing any previous one for `tool_type`.
    pub fn register<F>(&mut self, tool_type: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Tool> + Send + Sync + 'static,
    {
        let tool_type = tool_type.into();
        if self
            .factories
            .insert(tool_type.clone(), Box::new(factory))
            .is_some()
        {
            tracing::debug!("Replaced factory for tool type '{}'", tool_type);
        }
    }

    /// Fresh, uninitialized tool.
    pub fn create(&self, tool_type: &str) -> Result<Box<dyn Tool>, ConfigurationError> {
        self.factories
            .get(tool_type)
            .map(|factory| factory())
            .ok_or_else(|| ConfigurationError::UnknownToolType(tool_type.to_string()))
    }

    /// Create and initialize a named node.
    pub fn instantiate(
        &self,
        name: &str,
        tool_type: &str,
        params: ToolParams,
        ctx: &EngineContext,
    ) -> Result<ToolNode, ConfigurationError> {
        let tool = self.create(tool_type)?;
        ToolNode::new(name, tool_type, tool, params, ctx)
    }

    pub fn contains(&self, tool_type: &str) -> bool {
        self.factories.contains_key(tool_type)
    }

    /// Registered type names, sorted
    pub fn tool_types(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tool_types", &self.tool_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tools::PassthroughTool;
    use crate::memory::{BufferPool, BufferShape};

    fn ctx() -> EngineContext {
        EngineContext::new(BufferPool::new(1, BufferShape::new(2, 2, 1)))
    }

    #[test]
    fn test_builtin_registry() {
        let registry = ToolRegistry::with_builtin_tools();
        assert_eq!(registry.tool_types().len(), BuiltinTool::all().len());
        assert!(registry.contains("Threshold"));

        let node = registry
            .instantiate("Bin", "Threshold", ToolParams::new().with("level", 9), &ctx())
            .unwrap();
        assert_eq!(node.name(), "Bin");
        assert_eq!(node.tool_type(), "Threshold");
    }

    #[test]
    fn test_unknown_type_and_bad_params() {
        let registry = ToolRegistry::with_builtin_tools();
        assert_eq!(
            registry.create("Blob").err(),
            Some(ConfigurationError::UnknownToolType("Blob".to_string()))
        );
        assert!(matches!(
            registry.instantiate("Bin", "Threshold", ToolParams::new().with("level", "high"), &ctx()),
            Err(ConfigurationError::InvalidParameters { .. })
        ));
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = ToolRegistry::new();
        assert!(registry.tool_types().is_empty());
        registry.register("Relay", || Box::new(PassthroughTool::new()));
        assert!(registry.create("Relay").is_ok());
    }
}
