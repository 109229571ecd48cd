//! Staged, strictly ordered frame pipeline.
//!
//! # Architecture
//!
//! ```text
//! put_frame ─► [ingress] ─► Stage 1 ─► [q1] ─► Stage 2 ─► ... ─► [egress] ─► recv
//! ```
//!
//! - One worker thread per stage, never per frame
//! - Bounded crossbeam queues of depth K are the only flow control
//! - Full output queue: retry briefly, then apply the [`OverflowPolicy`]
//! - A panicking stage processor stops the whole pipeline

pub mod deterministic;
pub mod error;
pub mod item;
pub mod processor;
pub mod queue;
pub mod stage;

pub use deterministic::{DeterministicPipeline, StopReport};
pub use error::{PipelineError, PipelineResult, StageError};
pub use item::{PipelineItem, ResultBundle};
pub use processor::{FnStage, ProcedureStage, SharedProcedure, StageProcessor};
pub use queue::{BoundedQueue, OverflowPolicy, PushOutcome, QueueDepth};
pub use stage::{PipelineStage, StageState, StageStats};
