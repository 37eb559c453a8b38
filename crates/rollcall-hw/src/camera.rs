//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const REQUESTED_WIDTH: u32 = 640;
const REQUESTED_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;
const DARK_THRESHOLD: f32 = 0.95;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("cannot access camera {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("device does not support video capture")]
    CaptureNotSupported,
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed, the usual webcam format.
    Yuyv,
    /// 8-bit grayscale.
    Grey,
    /// 16-bit little-endian grayscale.
    Y16,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(Self::Yuyv),
            b"GREY" => Some(Self::Grey),
            b"Y16 " | b"Y16\0" => Some(Self::Y16),
            _ => None,
        }
    }
}

/// V4L2 camera device handle. The device is released on drop.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g. "/dev/video0").
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.raw_os_error() == Some(16) {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to query capabilities: {e}")))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::CaptureNotSupported);
        }

        let mut fmt = device
            .format()
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to get format: {e}")))?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = REQUESTED_WIDTH;
        fmt.height = REQUESTED_HEIGHT;

        let negotiated = device
            .set_format(&fmt)
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to set format: {e}")))?;

        let pixel_format = PixelFormat::from_fourcc(negotiated.fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {:?} (need YUYV, GREY, or Y16)",
                negotiated.fourcc
            ))
        })?;

        tracing::info!(
            device = device_path,
            card = %caps.card,
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?negotiated.fourcc,
            "camera opened"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc: negotiated.fourcc,
            pixel_format,
        })
    }

    /// Start streaming. Frames are read one at a time, blocking until ready.
    pub fn stream(&self) -> Result<FrameStream<'_>, CameraError> {
        let stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;
        Ok(FrameStream { camera: self, stream })
    }

    fn to_grayscale(&self, buf: &[u8]) -> Result<Vec<u8>, CameraError> {
        let converted = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_grayscale(buf, self.width, self.height),
            PixelFormat::Grey => frame::grey_to_grayscale(buf, self.width, self.height),
            PixelFormat::Y16 => frame::y16_to_grayscale(buf, self.width, self.height),
        };
        converted.map_err(|e| CameraError::CaptureFailed(format!("{:?} conversion: {e}", self.pixel_format)))
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

/// A live capture stream borrowed from an open [`Camera`].
pub struct FrameStream<'a> {
    camera: &'a Camera,
    stream: MmapStream<'a>,
}

impl FrameStream<'_> {
    /// Dequeue the next frame as grayscale.
    pub fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;
        let sequence = meta.sequence;
        let data = self.camera.to_grayscale(buf)?;
        let is_dark = frame::is_dark_frame(&data, DARK_THRESHOLD);
        if is_dark {
            tracing::debug!(seq = sequence, "dark frame");
        }

        Ok(Frame {
            data,
            width: self.camera.width,
            height: self.camera.height,
            sequence,
            is_dark,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_from_fourcc() {
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"GREY")), Some(PixelFormat::Grey));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"Y16 ")), Some(PixelFormat::Y16));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), None);
    }

    #[test]
    fn test_open_missing_device() {
        assert!(matches!(
            Camera::open("/dev/video-does-not-exist"),
            Err(CameraError::DeviceNotFound(_))
        ));
    }
}
