//! Video capture sources
//!
//! This module provides the frames the detector inspects and the recorder encodes.

pub mod ffmpeg;
pub mod traits;

#[cfg(feature = "webcam")]
pub mod webcam;

pub use ffmpeg::FfmpegFrameSource;
pub use traits::{CameraInfo, CaptureError, CaptureResult, Frame, FrameSource, Resolution};

/// Enumerate cameras known to the native backend
pub fn list_cameras() -> Vec<CameraInfo> {
    #[cfg(feature = "webcam")]
    {
        webcam::get_cameras()
    }

    #[cfg(not(feature = "webcam"))]
    {
        tracing::debug!("Camera enumeration needs the `webcam` feature");
        Vec::new()
    }
}
