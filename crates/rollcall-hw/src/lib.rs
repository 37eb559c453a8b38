//! rollcall-hw — Camera capture for the attendance pipeline.
//!
//! Opens a V4L2 device, negotiates a pixel format and hands out grayscale
//! frames from a persistent mmap stream.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, FrameStream, PixelFormat};
pub use frame::Frame;
