//! Port descriptors for tools.
//!
//! Each tool declares its ports via static `PortDescriptor` arrays. The
//! Procedure uses them to validate connections when they are made.

/// Name of the conventional image input
pub const INPUT_IMAGE: &str = "InputImage";
/// Name of the conventional image output
pub const OUTPUT_IMAGE: &str = "OutputImage";
/// Name of the conventional result dependency input
pub const INPUT_RESULT: &str = "InputResult";
/// Name of the conventional result output
pub const OUTPUT_RESULT: &str = "OutputResult";

/// The kind of data flowing through a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    /// Image ownership; an image input accepts exactly one upstream edge.
    Image,
    /// Result dependency only; any number of upstream edges.
    Result,
}

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    Input,
    Output,
}

/// Static descriptor for a tool's port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    pub name: &'static str,
    pub direction: PortDirection,
    pub kind: PortKind,
}

impl PortDescriptor {
    pub const fn input(name: &'static str, kind: PortKind) -> Self {
        Self {
            name,
            direction: PortDirection::Input,
            kind,
        }
    }

    pub const fn output(name: &'static str, kind: PortKind) -> Self {
        Self {
            name,
            direction: PortDirection::Output,
            kind,
        }
    }
}

/// Image in, image out, with result dependencies.
pub static IMAGE_TOOL_PORTS: &[PortDescriptor] = &[
    PortDescriptor::input(INPUT_IMAGE, PortKind::Image),
    PortDescriptor::input(INPUT_RESULT, PortKind::Result),
    PortDescriptor::output(OUTPUT_IMAGE, PortKind::Image),
    PortDescriptor::output(OUTPUT_RESULT, PortKind::Result),
];

/// Produces an image without consuming one.
pub static SOURCE_TOOL_PORTS: &[PortDescriptor] = &[
    PortDescriptor::input(INPUT_RESULT, PortKind::Result),
    PortDescriptor::output(OUTPUT_IMAGE, PortKind::Image),
    PortDescriptor::output(OUTPUT_RESULT, PortKind::Result),
];

/// Look up a port by name and direction.
pub fn find_port<'a>(
    ports: &'a [PortDescriptor],
    name: &str,
    direction: PortDirection,
) -> Option<&'a PortDescriptor> {
    ports
        .iter()
        .find(|p| p.name == name && p.direction == direction)
}
