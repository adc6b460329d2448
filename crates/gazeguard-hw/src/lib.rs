//! gazeguard-hw: hardware abstraction for webcam capture.
//!
//! Provides V4L2-based camera access and RGB frame conversion.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, CameraStream, PixelFormat};
pub use frame::{Frame, FrameError};
