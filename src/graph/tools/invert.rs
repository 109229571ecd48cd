//! InvertTool: photographic negative of the image, or of its ROI.

use crate::context::EngineContext;
use crate::data::{ImageData, ResultData};
use crate::graph::error::{ToolConfigError, ToolError};
use crate::graph::tool::{Tool, ToolOutput, ToolParams};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct InvertParams {
    /// Only touch pixels inside the image's ROI
    #[serde(default)]
    roi_only: bool,
}

#[derive(Debug, Default)]
pub struct InvertTool {
    params: InvertParams,
}

impl InvertTool {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tool for InvertTool {
    fn initialize(&mut self, params: &ToolParams, _ctx: &EngineContext) -> Result<(), ToolConfigError> {
        self.params = params.decode()?;
        Ok(())
    }

    fn requires_image_input(&self) -> bool {
        true
    }

    fn run(&mut self, input: Option<ImageData>, _upstream: ResultData) -> Result<ToolOutput, ToolError> {
        let mut image = input.ok_or_else(|| ToolError::MissingInput("InputImage".to_string()))?;

        let roi = if self.params.roi_only { image.roi() } else { None };
        let width = image.width() as usize;
        let channels = image.channels() as usize;
        let pixels = image.pixels_mut();

        let mut touched = 0u64;
        match roi {
            Some(roi) => {
                let row_len = roi.width as usize * channels;
                for y in roi.y..roi.y + roi.height {
                    let start = (y as usize * width + roi.x as usize) * channels;
                    for p in &mut pixels[start..start + row_len] {
                        *p = 255 - *p;
                    }
                    touched += row_len as u64;
                }
            }
            None => {
                for p in pixels.iter_mut() {
                    *p = 255 - *p;
                }
                touched = pixels.len() as u64;
            }
        }

        let mut results = ResultData::new().with_category("Preprocess");
        results.set_value("inverted_bytes", touched);
        Ok(ToolOutput::new(Some(image), results))
    }
}
