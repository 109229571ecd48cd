use crate::memory::PoolStats;
use crate::pipeline::{QueueDepth, StageStats};
use crate::solution::SolutionState;
use serde::Serialize;

/// Snapshot returned by `Solution::get_statistics`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolutionStatistics {
    pub state: SolutionState,
    pub available_buffers: usize,
    pub in_use_buffers: usize,
    pub pool: PoolStats,
    /// Ingress first, egress last; empty outside pipeline mode
    pub queue_depths: Vec<QueueDepth>,
    /// Bundles collected from the pipeline
    pub frames_processed: u64,
    /// Lost to backpressure between stages
    pub frames_dropped: u64,
    /// Refused at ingress
    pub frames_rejected: u64,
    pub stored_results: usize,
    pub stages: Vec<(String, StageStats)>,
}
