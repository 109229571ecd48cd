//! Values that flow through a chain: images, results and frames

pub mod frame;
pub mod image;
pub mod result;

pub use frame::{Frame, FrameId};
pub use image::{ImageData, PixelFormat, Roi};
pub use result::{ResultData, ResultEntry, ResultStatus};
