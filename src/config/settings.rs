//! Per-area engine settings
//!
//! Each section of the engine configuration file maps to one struct here:
//!
//! - [`PoolConfig`] - buffer pool capacity and frame shape (`[pool]`)
//! - [`PipelineConfig`] - queue depth, backpressure and drain timings (`[pipeline]`)
//! - [`SolutionConfig`] - result collector limits and the continuous run interval (`[solution]`)
//!
//! Every field has a serde default, so a partial file only overrides what it
//! names.

use crate::memory::BufferShape;
use crate::pipeline::OverflowPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of pre-allocated frame buffers
pub const DEFAULT_POOL_CAPACITY: usize = 8;

/// Default frame width in pixels
pub const DEFAULT_FRAME_WIDTH: u32 = 640;

/// Default frame height in pixels
pub const DEFAULT_FRAME_HEIGHT: u32 = 480;

/// Default channel count (mono)
pub const DEFAULT_FRAME_CHANNELS: u8 = 1;

/// Default bounded queue depth between stages
pub const DEFAULT_QUEUE_CAPACITY: usize = 3;

/// Default time a full output queue is retried before the overflow policy applies
pub const DEFAULT_BACKPRESSURE_RETRY_MS: u64 = 20;

/// Default wait on an empty input queue before re-checking the stop flag
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 20;

/// Default window for workers to join on stop
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 2000;

/// Default ingress enqueue timeout for `put_frame`
pub const DEFAULT_INGRESS_TIMEOUT_MS: u64 = 5;

/// Default number of completed bundles kept by the collector
pub const DEFAULT_MAX_STORED_RESULTS: usize = 64;

/// Default period of the continuous run loop
pub const DEFAULT_RUN_INTERVAL_MS: u64 = 100;

/// Buffer pool settings (`[pool]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of buffers pre-allocated at startup
    pub capacity: usize,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    /// Zero buffers when they return to the free list
    pub zero_on_release: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_POOL_CAPACITY,
            width: DEFAULT_FRAME_WIDTH,
            height: DEFAULT_FRAME_HEIGHT,
            channels: DEFAULT_FRAME_CHANNELS,
            zero_on_release: true,
        }
    }
}

impl PoolConfig {
    /// Shape of the buffers this pool hands out
    pub fn shape(&self) -> BufferShape {
        BufferShape::new(self.width, self.height, self.channels)
    }
}

/// Staged pipeline settings (`[pipeline]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Depth K of every bounded queue
    pub queue_capacity: usize,
    pub backpressure_retry_ms: u64,
    pub poll_interval_ms: u64,
    pub drain_timeout_ms: u64,
    pub ingress_timeout_ms: u64,
    /// What happens once a full output queue stays full past the retry window
    pub overflow_policy: OverflowPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            backpressure_retry_ms: DEFAULT_BACKPRESSURE_RETRY_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
            ingress_timeout_ms: DEFAULT_INGRESS_TIMEOUT_MS,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Same settings with a different queue depth
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn backpressure_retry(&self) -> Duration {
        Duration::from_millis(self.backpressure_retry_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn ingress_timeout(&self) -> Duration {
        Duration::from_millis(self.ingress_timeout_ms)
    }
}

/// Solution-level settings (`[solution]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolutionConfig {
    /// Completed bundles kept for retrieval; the oldest is evicted first
    pub max_stored_results: usize,
    /// Keep terminal images in stored bundles; otherwise they go back to the
    /// pool as soon as a bundle is collected
    pub retain_images: bool,
    /// Start-to-start period of continuous runs; a run that takes longer
    /// is followed immediately by the next
    pub run_interval_ms: u64,
}

impl Default for SolutionConfig {
    fn default() -> Self {
        Self {
            max_stored_results: DEFAULT_MAX_STORED_RESULTS,
            retain_images: false,
            run_interval_ms: DEFAULT_RUN_INTERVAL_MS,
        }
    }
}

impl SolutionConfig {
    pub fn run_interval(&self) -> Duration {
        Duration::from_millis(self.run_interval_ms)
    }
}
