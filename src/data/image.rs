//! Image payloads passed between tools

use crate::memory::{BufferPool, BufferShape, PooledBuffer};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Byte layout of a pixel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    #[default]
    Mono8,
    Rgb24,
    Bgr24,
    Rgba32,
    Bgra32,
}

impl PixelFormat {
    pub fn channels(&self) -> u8 {
        match self {
            PixelFormat::Mono8 => 1,
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => 3,
            PixelFormat::Rgba32 | PixelFormat::Bgra32 => 4,
        }
    }

    /// Default format for a channel count
    pub fn for_channels(channels: u8) -> Option<Self> {
        match channels {
            1 => Some(PixelFormat::Mono8),
            3 => Some(PixelFormat::Rgb24),
            4 => Some(PixelFormat::Rgba32),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PixelFormat::Mono8 => "MONO8",
            PixelFormat::Rgb24 => "RGB24",
            PixelFormat::Bgr24 => "BGR24",
            PixelFormat::Rgba32 => "RGBA32",
            PixelFormat::Bgra32 => "BGRA32",
        }
    }
}

/// Region of interest in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Non-empty and fully inside an image of the given size
    pub fn is_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.checked_add(self.width).is_some_and(|r| r <= width)
            && self.y.checked_add(self.height).is_some_and(|b| b <= height)
    }
}

/// An image owned by exactly one holder at a time
///
/// Moves between graph nodes and pipeline stages; copies are explicit via
/// [`ImageData::duplicate`]. Dropping it returns a pooled buffer to its pool.
pub struct ImageData {
    buffer: PooledBuffer,
    format: PixelFormat,
    timestamp: DateTime<Utc>,
    roi: Option<Roi>,
    camera_id: Option<String>,
    metadata: BTreeMap<String, serde_json::Value>,
}

impl ImageData {
    /// Wrap a buffer, inferring the pixel format from its channel count
    pub fn new(buffer: PooledBuffer) -> Self {
        let format = PixelFormat::for_channels(buffer.shape().channels).unwrap_or_default();
        Self {
            buffer,
            format,
            timestamp: Utc::now(),
            roi: None,
            camera_id: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Image backed by a pool buffer, or a direct allocation if the pool
    /// stays empty for `timeout`
    pub fn from_pool(pool: &BufferPool, timeout: Option<Duration>) -> Self {
        Self::new(pool.acquire_or_allocate(timeout))
    }

    /// Image over existing pixel bytes; `None` if the length does not match
    pub fn from_pixels(shape: BufferShape, pixels: Vec<u8>) -> Option<Self> {
        PooledBuffer::from_vec(shape, pixels).map(Self::new)
    }

    /// Unpooled image with every byte set to `value`
    pub fn filled(shape: BufferShape, value: u8) -> Self {
        let mut buffer = PooledBuffer::unpooled(shape);
        buffer.fill(value);
        Self::new(buffer)
    }

    /// Override the pixel format; `None` if its channel count does not match
    pub fn with_format(mut self, format: PixelFormat) -> Option<Self> {
        if format.channels() != self.channels() {
            return None;
        }
        self.format = format;
        Some(self)
    }

    pub fn with_camera_id(mut self, camera_id: impl Into<String>) -> Self {
        self.camera_id = Some(camera_id.into());
        self
    }

    pub fn width(&self) -> u32 {
        self.buffer.shape().width
    }

    pub fn height(&self) -> u32 {
        self.buffer.shape().height
    }

    pub fn channels(&self) -> u8 {
        self.buffer.shape().channels
    }

    pub fn shape(&self) -> BufferShape {
        self.buffer.shape()
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn pixels(&self) -> &[u8] {
        &self.buffer
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// Value of one channel at (x, y)
    pub fn pixel(&self, x: u32, y: u32, channel: u8) -> Option<u8> {
        if x >= self.width() || y >= self.height() || channel >= self.channels() {
            return None;
        }
        let stride = self.width() as usize * self.channels() as usize;
        let index =
            y as usize * stride + x as usize * self.channels() as usize + channel as usize;
        self.buffer.get(index).copied()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: DateTime<Utc>) {
        self.timestamp = timestamp;
    }

    pub fn roi(&self) -> Option<Roi> {
        self.roi
    }

    /// Set the region of interest; rejected (returns false) if it does not fit
    pub fn set_roi(&mut self, roi: Option<Roi>) -> bool {
        match roi {
            Some(r) if !r.is_within(self.width(), self.height()) => false,
            _ => {
                self.roi = roi;
                true
            }
        }
    }

    pub fn camera_id(&self) -> Option<&str> {
        self.camera_id.as_deref()
    }

    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut BTreeMap<String, serde_json::Value> {
        &mut self.metadata
    }

    pub fn is_pooled(&self) -> bool {
        self.buffer.is_pooled()
    }

    /// Give up the image and keep only its buffer
    pub fn into_buffer(self) -> PooledBuffer {
        self.buffer
    }

    /// Discard the image, returning a pooled buffer explicitly
    pub fn recycle(self) {
        self.buffer.recycle();
    }

    /// Deep copy, including metadata
    pub fn duplicate(&self) -> ImageData {
        ImageData {
            buffer: self.buffer.duplicate(),
            format: self.format,
            timestamp: self.timestamp,
            roi: self.roi,
            camera_id: self.camera_id.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// New unpooled image holding the pixels inside `roi`
    pub fn crop(&self, roi: &Roi) -> Option<ImageData> {
        if !roi.is_within(self.width(), self.height()) {
            return None;
        }

        let channels = self.channels() as usize;
        let src_stride = self.width() as usize * channels;
        let row_len = roi.width as usize * channels;
        let shape = BufferShape::new(roi.width, roi.height, self.channels());

        let mut buffer = PooledBuffer::unpooled(shape);
        for row in 0..roi.height as usize {
            let src_start = (roi.y as usize + row) * src_stride + roi.x as usize * channels;
            let dst_start = row * row_len;
            buffer[dst_start..dst_start + row_len]
                .copy_from_slice(&self.buffer[src_start..src_start + row_len]);
        }

        Some(ImageData {
            buffer,
            format: self.format,
            timestamp: self.timestamp,
            roi: None,
            camera_id: self.camera_id.clone(),
            metadata: self.metadata.clone(),
        })
    }

    /// Bytes covered by the ROI, or the whole image without one
    pub fn region_pixels(&self) -> Vec<u8> {
        match self.roi {
            Some(roi) => self
                .crop(&roi)
                .map(|c| c.pixels().to_vec())
                .unwrap_or_default(),
            None => self.pixels().to_vec(),
        }
    }
}

/// Equal content; the capture timestamp is not compared
impl PartialEq for ImageData {
    fn eq(&self, other: &Self) -> bool {
        self.shape() == other.shape()
            && self.format == other.format
            && self.roi == other.roi
            && self.camera_id == other.camera_id
            && self.metadata == other.metadata
            && self.pixels() == other.pixels()
    }
}

impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageData")
            .field("shape", &self.shape())
            .field("format", &self.format)
            .field("timestamp", &self.timestamp)
            .field("roi", &self.roi)
            .field("camera_id", &self.camera_id)
            .field("pooled", &self.is_pooled())
            .finish()
    }
}
