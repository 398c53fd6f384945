// Data structures for camera capture

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// A captured frame from the camera
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub timestamp: i64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub format: PixelFormat,
}

/// Pixel format of captured frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    RGBA8,
    BGRA8,
}

impl RawFrame {
    pub fn from_rgba(image: RgbaImage, timestamp: i64) -> Self {
        let (width, height) = image.dimensions();
        Self {
            timestamp,
            width,
            height,
            data: image.into_raw(),
            format: PixelFormat::RGBA8,
        }
    }

    /// Convert into an RGBA image buffer, swizzling BGRA sources.
    pub fn into_rgba_image(self) -> CaptureResult<RgbaImage> {
        let RawFrame {
            width,
            height,
            mut data,
            format,
            ..
        } = self;

        if format == PixelFormat::BGRA8 {
            for px in data.chunks_exact_mut(4) {
                px.swap(0, 2);
            }
        }

        RgbaImage::from_raw(width, height, data).ok_or_else(|| {
            CaptureError::CaptureFailed(format!(
                "frame buffer does not match {}x{} RGBA dimensions",
                width, height
            ))
        })
    }
}

/// Camera permission as seen by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraPermission {
    #[default]
    Pending,
    Granted,
    Denied,
}

impl CameraPermission {
    pub fn to_string(&self) -> &'static str {
        match self {
            CameraPermission::Pending => "pending",
            CameraPermission::Granted => "granted",
            CameraPermission::Denied => "denied",
        }
    }
}

/// Error types for camera capture operations
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("Not currently capturing")]
    NotCapturing,
}

pub type CaptureResult<T> = Result<T, CaptureError>;
