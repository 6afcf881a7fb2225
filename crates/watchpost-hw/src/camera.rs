//! V4L2 still capture via the `v4l` crate.
//!
//! One [`Camera`] owns one device handle. Open negotiates an RGB-capable
//! format (YUYV or RGB24 at 640x480), capture converts whatever the driver
//! hands back into an RGB [`Frame`].

use crate::frame::{self, Frame};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error(transparent)]
    Frame(#[from] frame::FrameError),
}

/// A V4L2 capture device discovered on the system.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Pixel layouts the capture path knows how to turn into RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed, 2 bytes/pixel.
    Yuyv,
    /// RGB24, 3 bytes/pixel, passed through.
    Rgb3,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"RGB3" => Some(PixelFormat::Rgb3),
            _ => None,
        }
    }
}

/// An open camera. Dropping it releases the device, so the owning view
/// never has to remember an explicit close on its error paths.
pub struct Camera {
    device: Device,
    pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
}

impl Camera {
    /// Open and configure the device at `device_path` (e.g. "/dev/video0").
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        let device = open_device(device_path)?;
        let (width, height, pixel_format) = negotiate_rgb_format(&device, device_path)?;

        Ok(Self {
            device,
            pixel_format,
            width,
            height,
            device_path: device_path.to_string(),
        })
    }

    /// Grab one still frame and convert it to RGB.
    pub fn capture_frame(&self) -> Result<Frame, CameraError> {
        let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::CaptureFailed(format!("mmap stream: {e}")))?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("dequeue: {e}")))?;

        Ok(Frame {
            data: self.decode_buffer(buf)?,
            width: self.width,
            height: self.height,
            timestamp: std::time::Instant::now(),
            sequence: meta.sequence,
        })
    }

    /// Turn a raw driver buffer into tightly packed RGB24.
    fn decode_buffer(&self, buf: &[u8]) -> Result<Vec<u8>, CameraError> {
        match self.pixel_format {
            PixelFormat::Yuyv => Ok(frame::yuyv_to_rgb(buf, self.width, self.height)?),
            PixelFormat::Rgb3 => {
                let expected = (self.width * self.height * 3) as usize;
                if buf.len() < expected {
                    return Err(CameraError::CaptureFailed(format!(
                        "short RGB3 buffer: {} of {expected} bytes",
                        buf.len()
                    )));
                }
                Ok(buf[..expected].to_vec())
            }
        }
    }

    /// Scan /dev for usable video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let Ok(entries) = std::fs::read_dir("/dev") else {
            return Vec::new();
        };

        let mut paths: Vec<String> = entries
            .flatten()
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| name.starts_with("video"))
            .map(|name| format!("/dev/{name}"))
            .collect();
        paths.sort();

        paths
            .into_iter()
            .filter_map(|path| {
                let caps = Device::with_path(&path).ok()?.query_caps().ok()?;
                caps.capabilities
                    .contains(v4l::capability::Flags::VIDEO_CAPTURE)
                    .then(|| DeviceInfo {
                        path,
                        name: caps.card.clone(),
                        driver: caps.driver.clone(),
                        bus: caps.bus.clone(),
                    })
            })
            .collect()
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        tracing::debug!(device = %self.device_path, "releasing camera");
    }
}

fn open_device(device_path: &str) -> Result<Device, CameraError> {
    if !Path::new(device_path).exists() {
        return Err(CameraError::DeviceNotFound(device_path.to_string()));
    }

    let device = Device::with_path(device_path).map_err(|e| {
        let msg = e.to_string();
        if msg.contains("busy") || msg.contains("EBUSY") {
            CameraError::DeviceBusy
        } else {
            CameraError::DeviceNotFound(format!("{device_path}: {e}"))
        }
    })?;

    let caps = device
        .query_caps()
        .map_err(|e| CameraError::CaptureFailed(format!("query caps: {e}")))?;
    if !caps
        .capabilities
        .contains(v4l::capability::Flags::VIDEO_CAPTURE)
    {
        return Err(CameraError::StreamingNotSupported);
    }

    tracing::info!(device = device_path, driver = %caps.driver, card = %caps.card, "camera opened");
    Ok(device)
}

/// Ask for YUYV at the capture resolution and accept whatever RGB-capable
/// layout the driver settles on.
fn negotiate_rgb_format(
    device: &Device,
    device_path: &str,
) -> Result<(u32, u32, PixelFormat), CameraError> {
    let mut fmt = device
        .format()
        .map_err(|e| CameraError::FormatNegotiationFailed(format!("get format: {e}")))?;
    fmt.width = CAPTURE_WIDTH;
    fmt.height = CAPTURE_HEIGHT;
    fmt.fourcc = FourCC::new(b"YUYV");

    let negotiated = device
        .set_format(&fmt)
        .map_err(|e| CameraError::FormatNegotiationFailed(format!("set format: {e}")))?;

    let pixel_format = PixelFormat::from_fourcc(negotiated.fourcc).ok_or_else(|| {
        CameraError::FormatNegotiationFailed(format!(
            "driver insists on {:?}, need YUYV or RGB3",
            negotiated.fourcc
        ))
    })?;

    tracing::info!(
        device = device_path,
        width = negotiated.width,
        height = negotiated.height,
        format = ?pixel_format,
        "format negotiated"
    );

    Ok((negotiated.width, negotiated.height, pixel_format))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_device() {
        let err = Camera::open("/nonexistent/video99").unwrap_err();
        assert!(matches!(err, CameraError::DeviceNotFound(path) if path.contains("video99")));
    }

    #[test]
    fn test_pixel_format_from_fourcc() {
        assert_eq!(
            PixelFormat::from_fourcc(FourCC::new(b"YUYV")),
            Some(PixelFormat::Yuyv)
        );
        assert_eq!(
            PixelFormat::from_fourcc(FourCC::new(b"RGB3")),
            Some(PixelFormat::Rgb3)
        );
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"GREY")), None);
    }
}
