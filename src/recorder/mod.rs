//! Recording backends
//!
//! - `Recorder` / `RecorderFactory` traits consumed by the controller
//! - FFmpeg recorder encoding frames from the shared source into MP4 clips

pub mod ffmpeg;
pub mod traits;

pub use ffmpeg::{FfmpegRecorder, FfmpegRecorderFactory};
pub use traits::{
    ClipData, DataCallback, Recorder, RecorderFactory, RecordingError, RecordingResult,
};
