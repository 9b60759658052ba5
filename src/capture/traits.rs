//! Capture trait definitions
//!
//! Platform-agnostic types for frame sources.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while acquiring or reading a video source
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Timed out waiting for the first frame after {0}ms")]
    AcquireTimeout(u64),

    #[error("No frame available yet")]
    NoFrame,

    #[error("Capture source closed")]
    Closed,
}

/// Result type for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Information about a camera/webcam
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    /// Unique device ID
    pub id: String,

    /// Device name
    pub name: String,

    /// Supported resolutions
    pub supported_resolutions: Vec<Resolution>,
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Size in bytes of one RGBA frame at this resolution
    pub fn rgba_frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// One sampled RGBA image from the live source
///
/// Pixel data is shared, so cloning a frame is cheap.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame dimensions
    pub resolution: Resolution,

    /// Tightly packed RGBA pixels
    pub data: Arc<Vec<u8>>,

    /// Monotonic index assigned by the source
    pub sequence: u64,
}

impl Frame {
    pub fn new(resolution: Resolution, data: Vec<u8>, sequence: u64) -> Self {
        Self {
            resolution,
            data: Arc::new(data),
            sequence,
        }
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }
}

/// A live source that can hand out its most recent frame on demand
///
/// Implementations are acquired up front (opening the device is where acquisition
/// fails); after that `current_frame` only fails transiently.
pub trait FrameSource: Send + Sync {
    /// Human readable identifier used in logs
    fn id(&self) -> &str;

    /// Resolution of frames produced by this source
    fn resolution(&self) -> Resolution;

    /// Nominal frame rate of the source
    fn fps(&self) -> u32;

    /// Latest frame delivered by the device
    fn current_frame(&self) -> CaptureResult<Frame>;
}
