//! Detection-driven recording controller
//!
//! This module implements the core loop:
//! - DetectionHistory, the hysteresis window smoothing per-frame detections
//! - ControllerState, the start/stop decisions for the recorder
//! - RecordingController, the poll loop and the host-facing commands
//! - ClipRegistry, the clips produced by recorder flushes

pub mod coordinator;
pub mod history;
pub mod registry;
pub mod scheduler;
pub mod state;

pub use coordinator::RecordingController;
pub use history::DetectionHistory;
pub use registry::{ClipHandle, ClipRecord, ClipRegistry, ClipSummary};
pub use scheduler::{ImmediateScheduler, IntervalScheduler, RefreshScheduler};
pub use state::{ControllerEvent, ControllerState, ControllerStatus, Decision, RunState};
