//! watchpost-hw — Hardware abstraction for camera capture.
//!
//! Provides V4L2-based still capture producing RGB frames. The device
//! handle is scoped: dropping the [`Camera`] releases the device no
//! matter how the owning view exits.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError};
