//! MeanIntensityTool: grey-level statistics over the image or its ROI.
//!
//! Result only: the tool has no image output, so the input image goes back
//! to its pool once measured.

use crate::context::EngineContext;
use crate::data::{ImageData, ResultData};
use crate::graph::error::{ToolConfigError, ToolError};
use crate::graph::port::{PortDescriptor, PortKind, INPUT_IMAGE, INPUT_RESULT, OUTPUT_RESULT};
use crate::graph::tool::{Tool, ToolOutput, ToolParams};

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::input(INPUT_IMAGE, PortKind::Image),
    PortDescriptor::input(INPUT_RESULT, PortKind::Result),
    PortDescriptor::output(OUTPUT_RESULT, PortKind::Result),
];

#[derive(Debug, Default)]
pub struct MeanIntensityTool;

impl MeanIntensityTool {
    pub fn new() -> Self {
        Self
    }
}

impl Tool for MeanIntensityTool {
    fn ports(&self) -> Vec<PortDescriptor> {
        PORTS.to_vec()
    }

    fn initialize(&mut self, params: &ToolParams, _ctx: &EngineContext) -> Result<(), ToolConfigError> {
        if !params.is_empty() {
            return Err(ToolConfigError::InvalidParameters(
                "MeanIntensity takes no parameters".to_string(),
            ));
        }
        Ok(())
    }

    fn requires_image_input(&self) -> bool {
        true
    }

    fn run(&mut self, input: Option<ImageData>, _upstream: ResultData) -> Result<ToolOutput, ToolError> {
        let image = input.ok_or_else(|| ToolError::MissingInput("InputImage".to_string()))?;
        let region = image.region_pixels();
        image.recycle();

        if region.is_empty() {
            return Err(ToolError::InvalidInput("empty measurement region".to_string()));
        }

        let sum: u64 = region.iter().map(|&p| p as u64).sum();
        let mean = sum as f64 / region.len() as f64;
        let min = region.iter().copied().min().unwrap_or(0);
        let max = region.iter().copied().max().unwrap_or(0);

        let mut results = ResultData::new().with_category("Measure");
        results.set_value("mean", mean);
        results.set_value("min", min);
        results.set_value("max", max);
        results.set_value("samples", region.len() as u64);
        Ok(ToolOutput::new(None, results))
    }
}
