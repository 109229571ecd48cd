//! Built-in tool type enumeration.
//!
//! Names the tools that ship with the engine so a registry can be
//! populated without knowing their concrete types.

use crate::graph::tool::Tool;
use crate::graph::tools::{
    ConstantSourceTool, InvertTool, MeanIntensityTool, PassthroughTool, ThresholdTool,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Tools that can be instantiated without an external algorithm library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinTool {
    // Sources
    /// Uniform image drawn from the engine pool.
    ConstantSource,

    // Image transforms
    /// Hands the image on unchanged.
    Passthrough,
    /// Photographic negative.
    Invert,
    /// Fixed-level binarization.
    Threshold,

    // Measurements
    /// Grey-level statistics; result only.
    MeanIntensity,
}

impl BuiltinTool {
    /// Type name used in graph definitions.
    pub fn type_name(&self) -> &'static str {
        match self {
            BuiltinTool::ConstantSource => "ConstantSource",
            BuiltinTool::Passthrough => "Passthrough",
            BuiltinTool::Invert => "Invert",
            BuiltinTool::Threshold => "Threshold",
            BuiltinTool::MeanIntensity => "MeanIntensity",
        }
    }

    /// Get the display name for this tool type.
    pub fn display_name(&self) -> &'static str {
        match self {
            BuiltinTool::ConstantSource => "Constant Source",
            BuiltinTool::Passthrough => "Passthrough",
            BuiltinTool::Invert => "Invert",
            BuiltinTool::Threshold => "Threshold",
            BuiltinTool::MeanIntensity => "Mean Intensity",
        }
    }

    /// Get all built-in tool types.
    pub fn all() -> &'static [BuiltinTool] {
        &[
            BuiltinTool::ConstantSource,
            BuiltinTool::Passthrough,
            BuiltinTool::Invert,
            BuiltinTool::Threshold,
            BuiltinTool::MeanIntensity,
        ]
    }

    /// Check if this tool produces images without consuming one.
    pub fn is_source(&self) -> bool {
        matches!(self, BuiltinTool::ConstantSource)
    }

    /// Get a detailed description of what this tool does.
    pub fn description(&self) -> &'static str {
        match self {
            BuiltinTool::ConstantSource =>
                "Produces a uniform image every run.\n\
                 Draws its buffer from the engine pool.\n\
                 Params: width, height, channels, value, camera_id.",

            BuiltinTool::Passthrough =>
                "Forwards the input image unchanged.\n\
                 Useful as a fan-out point.",

            BuiltinTool::Invert =>
                "Inverts every byte (255 - p).\n\
                 Params: roi_only.",

            BuiltinTool::Threshold =>
                "Binarizes at a fixed level.\n\
                 Reports the foreground pixel count.\n\
                 Params: level (0-255), invert.",

            BuiltinTool::MeanIntensity =>
                "Mean, min and max over the image or its ROI.\n\
                 Consumes the image; results only.",
        }
    }

    /// Create a fresh, uninitialized tool instance.
    pub fn create(&self) -> Box<dyn Tool> {
        match self {
            BuiltinTool::ConstantSource => Box::new(ConstantSourceTool::new()),
            BuiltinTool::Passthrough => Box::new(PassthroughTool::new()),
            BuiltinTool::Invert => Box::new(InvertTool::new()),
            BuiltinTool::Threshold => Box::new(ThresholdTool::new()),
            BuiltinTool::MeanIntensity => Box::new(MeanIntensityTool::new()),
        }
    }
}

impl std::fmt::Display for BuiltinTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for BuiltinTool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BuiltinTool::all()
            .iter()
            .copied()
            .find(|t| t.type_name() == s)
            .ok_or_else(|| format!("unknown built-in tool '{}'", s))
    }
}
