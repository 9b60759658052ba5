//! Configuration schema
//!
//! Every field has a default so a partial (or missing) config file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// =============================================================================
// Controller
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerConfig {
    /// Detection class that counts as presence
    pub target_class: String,

    /// Number of recent samples kept in the hysteresis window
    pub history_capacity: usize,

    /// Delay between polling iterations (one display refresh)
    pub refresh_interval_ms: u64,

    /// Upper bound on a single detector call
    pub detect_timeout_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            target_class: "person".to_string(),
            history_capacity: 10,
            refresh_interval_ms: 16,
            detect_timeout_ms: 5_000,
        }
    }
}

impl ControllerConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn detect_timeout(&self) -> Duration {
        Duration::from_millis(self.detect_timeout_ms)
    }
}

// =============================================================================
// Source
// =============================================================================

/// Which capture backend opens the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceBackend {
    /// FFmpeg subprocess decoding `input`
    #[default]
    Ffmpeg,
    /// Native camera via nokhwa (`webcam` feature); `input` is the device id
    Webcam,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceConfig {
    pub backend: SourceBackend,

    /// FFmpeg input (device path, URL or file), or the webcam device id
    pub input: String,

    /// FFmpeg demuxer for the input, e.g. `v4l2`, `avfoundation`, `dshow`
    pub input_format: Option<String>,

    pub width: u32,
    pub height: u32,
    pub fps: u32,

    /// How long to wait for the first frame before giving up
    pub acquire_timeout_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            backend: SourceBackend::default(),
            input: default_input().to_string(),
            input_format: default_input_format().map(str::to_string),
            width: 640,
            height: 480,
            fps: 30,
            acquire_timeout_ms: 10_000,
        }
    }
}

fn default_input() -> &'static str {
    #[cfg(target_os = "macos")]
    {
        "0"
    }

    #[cfg(target_os = "windows")]
    {
        "video=Integrated Camera"
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        "/dev/video0"
    }
}

fn default_input_format() -> Option<&'static str> {
    #[cfg(target_os = "macos")]
    {
        Some("avfoundation")
    }

    #[cfg(target_os = "windows")]
    {
        Some("dshow")
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        Some("v4l2")
    }
}

// =============================================================================
// Detector
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectorConfig {
    /// Inference program speaking the line protocol on stdin/stdout
    pub program: String,

    pub args: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            program: "presence-detector".to_string(),
            args: Vec::new(),
        }
    }
}

// =============================================================================
// Recorder
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    /// Directory receiving finished clips
    pub output_dir: PathBuf,

    /// Encoding frame rate
    pub fps: u32,

    /// H.264 CRF (lower = higher quality)
    pub crf: u8,

    /// x264 preset
    pub preset: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("clips"),
            fps: 30,
            crf: 23,
            preset: "veryfast".to_string(),
        }
    }
}

// =============================================================================
// Application
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub controller: ControllerConfig,
    pub source: SourceConfig,
    pub detector: DetectorConfig,
    pub recorder: RecorderConfig,
}
