//! # VisChain-RS: Visual Inspection Execution Core
//!
//! The execution substrate underneath an inspection chain editor. A chain is a
//! directed acyclic graph of tools ([`graph::Procedure`]); the engine runs it
//! once per call on the caller's thread, on a timer, or frame by frame
//! through a staged, strictly ordered pipeline
//! ([`pipeline::DeterministicPipeline`]).
//!
//! ## Architecture
//!
//! - **Memory**: [`memory::BufferPool`] hands out fixed-shape image buffers as
//!   exclusive [`memory::PooledBuffer`] handles
//! - **Data**: [`data::ImageData`], [`data::ResultData`] and [`data::Frame`]
//!   move between nodes and stages by ownership transfer
//! - **Graph**: [`graph::Procedure`] validates connections at mutation time and
//!   executes tools in topological order
//! - **Pipeline**: one worker thread per stage, bounded crossbeam queues,
//!   drop-oldest backpressure
//! - **Solution**: [`solution::Solution`] owns procedures and switches between
//!   run-once, continuous and pipeline mode
//!
//! ## Configuration
//!
//! Engine settings live in a TOML file (see [`config::EngineConfig`]), by
//! default under the platform data directory in `dev.hxyulin.vischain-rs`.
//!
//! ## Example
//!
//! ```ignore
//! use vischain_rs::{
//!     config::EngineConfig,
//!     context::EngineContext,
//!     data::ImageData,
//!     graph::{Procedure, ToolRegistry, GraphDefinition},
//!     solution::Solution,
//! };
//! use std::path::Path;
//!
//! let config = EngineConfig::load_or_default();
//! let ctx = EngineContext::from_config(&config);
//! let registry = ToolRegistry::with_builtin_tools();
//! let definition = GraphDefinition::load(Path::new("chain.json"))?;
//! let procedure = Procedure::from_definition(&definition, &registry, &ctx)?;
//!
//! let mut solution = Solution::from_config("line-1", &config, ctx.clone());
//! solution.add_procedure(procedure)?;
//!
//! let image = ImageData::from_pool(ctx.pool(), None);
//! let bundle = solution.run_once(Some(image))?;
//! ```

pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod graph;
pub mod memory;
pub mod pipeline;
pub mod solution;

// Re-export commonly used types
pub use config::EngineConfig;
pub use context::{EngineContext, ServiceRegistry};
pub use data::{Frame, FrameId, ImageData, ResultData};
pub use error::{Result, VisionError};
pub use graph::{Procedure, Tool, ToolNode, ToolRegistry};
pub use memory::{BufferPool, BufferShape, PooledBuffer};
pub use pipeline::DeterministicPipeline;
pub use solution::{ResultBundle, Solution};
