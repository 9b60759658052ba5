//! Recorder trait definitions
//!
//! A recorder is created bound to a frame source and a data callback. Finished
//! media is delivered through the callback, usually some time after `stop()`.

use crate::capture::FrameSource;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Recording-related errors
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    #[error("Already recording")]
    AlreadyRecording,

    #[error("Not recording")]
    NotRecording,

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

pub type RecordingResult<T> = Result<T, RecordingError>;

/// Media flushed by a recorder
#[derive(Debug, Clone, PartialEq)]
pub enum ClipData {
    /// Encoded bytes held in memory
    Buffer(Arc<Vec<u8>>),
    /// Encoded file on disk
    File(PathBuf),
}

impl ClipData {
    /// Size of the clip in bytes, if known
    pub fn size_bytes(&self) -> Option<u64> {
        match self {
            ClipData::Buffer(bytes) => Some(bytes.len() as u64),
            ClipData::File(path) => std::fs::metadata(path).ok().map(|m| m.len()),
        }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            ClipData::File(path) => Some(path),
            ClipData::Buffer(_) => None,
        }
    }
}

/// Invoked once per data flush; may run on any thread, at any time
pub type DataCallback = Arc<dyn Fn(ClipData) + Send + Sync>;

/// A live recording resource
pub trait Recorder: Send {
    /// Begin capturing
    fn start(&mut self) -> RecordingResult<()>;

    /// Stop capturing. Data is flushed through the callback asynchronously.
    fn stop(&mut self) -> RecordingResult<()>;

    fn is_recording(&self) -> bool;
}

/// Builds recorders bound to a frame source
pub trait RecorderFactory: Send + Sync {
    fn create(
        &self,
        source: Arc<dyn FrameSource>,
        on_data: DataCallback,
    ) -> RecordingResult<Box<dyn Recorder>>;
}
