//! ThresholdTool: binarize an image at a fixed level.
//!
//! Pixels at or above `level` become 255, the rest 0 (swapped when
//! `invert` is set). Reports how many bytes ended up in the foreground.

use crate::context::EngineContext;
use crate::data::{ImageData, ResultData};
use crate::graph::error::{ToolConfigError, ToolError};
use crate::graph::tool::{Tool, ToolOutput, ToolParams};
use serde::Deserialize;

const DEFAULT_LEVEL: u8 = 128;

fn default_level() -> u8 {
    DEFAULT_LEVEL
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdParams {
    #[serde(default = "default_level")]
    pub level: u8,
    #[serde(default)]
    pub invert: bool,
}

impl Default for ThresholdParams {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            invert: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct ThresholdTool {
    params: ThresholdParams,
}

impl ThresholdTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(&self) -> &ThresholdParams {
        &self.params
    }
}

impl Tool for ThresholdTool {
    fn initialize(&mut self, params: &ToolParams, _ctx: &EngineContext) -> Result<(), ToolConfigError> {
        self.params = params.decode()?;
        Ok(())
    }

    fn requires_image_input(&self) -> bool {
        true
    }

    fn run(&mut self, input: Option<ImageData>, _upstream: ResultData) -> Result<ToolOutput, ToolError> {
        let mut image = input.ok_or_else(|| ToolError::MissingInput("InputImage".to_string()))?;
        let (on, off) = if self.params.invert { (0, 255) } else { (255, 0) };

        let mut foreground = 0u64;
        for p in image.pixels_mut() {
            *p = if *p >= self.params.level { on } else { off };
            if *p == 255 {
                foreground += 1;
            }
        }

        let mut results = ResultData::new().with_category("Preprocess");
        results.set_value("level", self.params.level);
        results.set_value("foreground_pixels", foreground);
        Ok(ToolOutput::new(Some(image), results))
    }
}
