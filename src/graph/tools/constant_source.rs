//! ConstantSourceTool: produces a uniform image from the engine's pool.
//!
//! Stands in for a camera: it needs no input image and writes one frame per
//! run. A shape different from the pool's is served as a pool miss.

use crate::context::EngineContext;
use crate::data::{ImageData, PixelFormat, ResultData};
use crate::graph::error::{ToolConfigError, ToolError};
use crate::graph::port::{PortDescriptor, SOURCE_TOOL_PORTS};
use crate::graph::tool::{Tool, ToolOutput, ToolParams};
use crate::memory::{BufferPool, BufferShape};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SourceParams {
    /// Defaults to the pool's shape when unset
    width: Option<u32>,
    height: Option<u32>,
    channels: Option<u8>,
    #[serde(default)]
    value: u8,
    camera_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct ConstantSourceTool {
    pool: Option<BufferPool>,
    shape: Option<BufferShape>,
    value: u8,
    camera_id: Option<String>,
    frames: u64,
}

impl ConstantSourceTool {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tool for ConstantSourceTool {
    fn ports(&self) -> Vec<PortDescriptor> {
        SOURCE_TOOL_PORTS.to_vec()
    }

    fn initialize(&mut self, params: &ToolParams, ctx: &EngineContext) -> Result<(), ToolConfigError> {
        let decoded: SourceParams = params.decode()?;
        let pool_shape = ctx.pool().shape();
        let shape = BufferShape::new(
            decoded.width.unwrap_or(pool_shape.width),
            decoded.height.unwrap_or(pool_shape.height),
            decoded.channels.unwrap_or(pool_shape.channels),
        );

        if shape.byte_len() == 0 {
            return Err(ToolConfigError::InvalidParameters(format!(
                "image shape {} is empty",
                shape
            )));
        }
        if PixelFormat::for_channels(shape.channels).is_none() {
            return Err(ToolConfigError::InvalidParameters(format!(
                "unsupported channel count {}",
                shape.channels
            )));
        }

        self.pool = Some(ctx.pool().clone());
        self.shape = Some(shape);
        self.value = decoded.value;
        self.camera_id = decoded.camera_id;
        Ok(())
    }

    fn requires_image_input(&self) -> bool {
        false
    }

    fn run(&mut self, _input: Option<ImageData>, _upstream: ResultData) -> Result<ToolOutput, ToolError> {
        let (Some(pool), Some(shape)) = (&self.pool, self.shape) else {
            return Err(ToolError::Failed("source not initialized".to_string()));
        };

        let buffer = if shape == pool.shape() {
            pool.acquire_or_allocate(Some(Duration::ZERO))
        } else {
            pool.acquire_shaped(shape, Some(Duration::ZERO))
                .ok_or_else(|| ToolError::Failed(format!("no {} buffer available", shape)))?
        };

        let mut image = ImageData::new(buffer);
        image.pixels_mut().fill(self.value);
        if let Some(format) = PixelFormat::for_channels(shape.channels) {
            image = image
                .with_format(format)
                .ok_or_else(|| ToolError::Failed("pixel format mismatch".to_string()))?;
        }
        if let Some(camera_id) = &self.camera_id {
            image = image.with_camera_id(camera_id.clone());
        }

        self.frames += 1;
        let mut results = ResultData::new().with_category("Acquire");
        results.set_value("frame", self.frames);
        results.set_value("pooled", image.is_pooled());
        Ok(ToolOutput::new(Some(image), results))
    }
}
