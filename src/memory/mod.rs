//! Image buffer memory management
//!
//! Frames are large and arrive at a steady rate, so their buffers come from a
//! fixed-capacity [`BufferPool`] instead of the allocator. A buffer leaves the
//! pool as an exclusive [`PooledBuffer`] handle and goes back either through
//! [`BufferPool::release`] or when the handle is dropped.

pub mod pool;

pub use pool::{BufferPool, BufferShape, PoolStats, PooledBuffer};
