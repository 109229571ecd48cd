//! Built-in utility tools.
//!
//! Enough to build and exercise chains without an external algorithm
//! library.

pub mod constant_source;
pub mod invert;
pub mod mean_intensity;
pub mod passthrough;
pub mod threshold;

pub use constant_source::ConstantSourceTool;
pub use invert::InvertTool;
pub use mean_intensity::MeanIntensityTool;
pub use passthrough::PassthroughTool;
pub use threshold::ThresholdTool;
