//! PassthroughTool: hands its input image on unchanged.

use crate::context::EngineContext;
use crate::data::{ImageData, ResultData};
use crate::graph::error::{ToolConfigError, ToolError};
use crate::graph::tool::{Tool, ToolOutput, ToolParams};

#[derive(Debug, Default)]
pub struct PassthroughTool;

impl PassthroughTool {
    pub fn new() -> Self {
        Self
    }
}

impl Tool for PassthroughTool {
    fn initialize(&mut self, params: &ToolParams, _ctx: &EngineContext) -> Result<(), ToolConfigError> {
        if !params.is_empty() {
            return Err(ToolConfigError::InvalidParameters(
                "Passthrough takes no parameters".to_string(),
            ));
        }
        Ok(())
    }

    fn requires_image_input(&self) -> bool {
        true
    }

    fn run(&mut self, input: Option<ImageData>, _upstream: ResultData) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::image(input))
    }
}
