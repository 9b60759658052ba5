//! Controller state machine
//!
//! `ControllerState` is owned by the poll loop. It holds the hysteresis window and
//! the live recorder, and turns one detection outcome into a recorder decision.

use super::history::DetectionHistory;
use super::registry::{ClipRecord, ClipRegistry};
use crate::capture::FrameSource;
use crate::recorder::{ClipData, DataCallback, Recorder, RecorderFactory};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Whether the poll loop is wanted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// No polling
    Stopped,
    /// Polling active
    Running,
}

impl Default for RunState {
    fn default() -> Self {
        Self::Stopped
    }
}

/// Outcome of one polling iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Target seen in this frame; recording
    Detected,
    /// Not seen, but seen recently; recording continues
    Holding,
    /// Not seen recently; recording stopped (or never started)
    Idle,
}

/// Events emitted by the controller
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControllerEvent {
    /// Poll loop started
    Started,
    /// Poll loop halted
    Stopped,
    /// A recorder went live
    RecordingStarted,
    /// The live recorder was stopped
    RecordingStopped,
    /// One iteration made a decision
    Decision { decision: Decision, iteration: u64 },
    /// An iteration was skipped (no frame, detector error or timeout)
    DetectionFailed { message: String },
    /// A recorder could not be created, started or stopped
    RecorderFailed { message: String },
    /// A flushed clip was registered
    ClipAdded { id: Uuid, label: String },
}

/// Snapshot of the controller for the host application
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerStatus {
    pub run_state: RunState,
    pub is_recording: bool,
    pub is_start_enabled: bool,
    pub is_stop_enabled: bool,
    pub decisions: u64,
    pub clip_count: usize,
}

pub struct ControllerState {
    history: DetectionHistory,
    recorder: Option<Box<dyn Recorder>>,
    source: Arc<dyn FrameSource>,
    factory: Arc<dyn RecorderFactory>,
    registry: ClipRegistry,
    event_tx: broadcast::Sender<ControllerEvent>,
    /// Mirror of `recorder.is_some()` readable without the state lock
    recording: Arc<AtomicBool>,
}

impl ControllerState {
    pub fn new(
        history_capacity: usize,
        source: Arc<dyn FrameSource>,
        factory: Arc<dyn RecorderFactory>,
        registry: ClipRegistry,
        event_tx: broadcast::Sender<ControllerEvent>,
    ) -> Self {
        Self {
            history: DetectionHistory::new(history_capacity),
            recorder: None,
            source,
            factory,
            registry,
            event_tx,
            recording: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn history(&self) -> &DetectionHistory {
        &self.history
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_some()
    }

    pub(crate) fn recording_flag(&self) -> Arc<AtomicBool> {
        self.recording.clone()
    }

    /// Apply one detection outcome.
    ///
    /// The window is consulted before this outcome is pushed, so a single positive
    /// keeps recording alive until it is evicted by later samples.
    pub fn apply(&mut self, found: bool) -> Decision {
        self.reap_dead_recorder();

        if found {
            self.start_recording();
            self.history.push(true);
            Decision::Detected
        } else if self.history.has_recent_positive() {
            self.start_recording();
            self.history.push(false);
            Decision::Holding
        } else {
            self.stop_recording();
            Decision::Idle
        }
    }

    /// Bring a recorder up. No-op while one is live.
    pub fn start_recording(&mut self) {
        self.reap_dead_recorder();
        if self.recorder.is_some() {
            return;
        }

        let on_data = clip_callback(self.registry.clone(), self.event_tx.clone());
        let mut recorder = match self.factory.create(self.source.clone(), on_data) {
            Ok(recorder) => recorder,
            Err(e) => {
                tracing::error!("Failed to create recorder: {}", e);
                let _ = self.event_tx.send(ControllerEvent::RecorderFailed {
                    message: e.to_string(),
                });
                return;
            }
        };

        // Only a started recorder is kept; a failed one is dropped here
        if let Err(e) = recorder.start() {
            tracing::error!("Failed to start recorder: {}", e);
            let _ = self.event_tx.send(ControllerEvent::RecorderFailed {
                message: e.to_string(),
            });
            return;
        }

        self.recorder = Some(recorder);
        self.recording.store(true, Ordering::SeqCst);
        let _ = self.event_tx.send(ControllerEvent::RecordingStarted);
        tracing::info!("Start recording");
    }

    /// Drop a recorder that stopped on its own so the next start replaces it.
    ///
    /// The window is kept: the person may still be in view.
    fn reap_dead_recorder(&mut self) {
        let dead = matches!(&self.recorder, Some(recorder) if !recorder.is_recording());
        if !dead {
            return;
        }

        self.recorder = None;
        self.recording.store(false, Ordering::SeqCst);
        tracing::error!("Recorder stopped unexpectedly, dropping it");
        let _ = self.event_tx.send(ControllerEvent::RecorderFailed {
            message: "recorder stopped unexpectedly".to_string(),
        });
    }

    /// Stop the live recorder and reset the window. No-op while idle.
    pub fn stop_recording(&mut self) {
        self.reap_dead_recorder();
        let Some(mut recorder) = self.recorder.take() else {
            return;
        };

        if let Err(e) = recorder.stop() {
            tracing::error!("Failed to stop recorder: {}", e);
            let _ = self.event_tx.send(ControllerEvent::RecorderFailed {
                message: e.to_string(),
            });
        }
        drop(recorder);

        self.recording.store(false, Ordering::SeqCst);
        self.history.clear();
        let _ = self.event_tx.send(ControllerEvent::RecordingStopped);
        tracing::info!("Stopped recording");
    }

    /// Terminal step of a run: nothing recording, nothing remembered
    pub fn halt(&mut self) {
        self.stop_recording();
        self.history.clear();
    }
}

/// Data callback registering each flush as a clip.
///
/// Closes over the registry handle only, so flushes arriving after the recorder
/// was dropped (or after a new session started) still land.
fn clip_callback(
    registry: ClipRegistry,
    event_tx: broadcast::Sender<ControllerEvent>,
) -> DataCallback {
    Arc::new(move |data: ClipData| {
        let record = ClipRecord::new(data);
        let (id, label) = (record.id(), record.label.clone());
        registry.append(record);
        tracing::info!("Clip added: {} ({})", label, id);
        let _ = event_tx.send(ControllerEvent::ClipAdded { id, label });
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureError, CaptureResult, Frame, Resolution};
    use crate::recorder::{RecordingError, RecordingResult};
    use parking_lot::Mutex;

    struct NullSource;

    impl FrameSource for NullSource {
        fn id(&self) -> &str {
            "null"
        }
        fn resolution(&self) -> Resolution {
            Resolution { width: 1, height: 1 }
        }
        fn fps(&self) -> u32 {
            30
        }
        fn current_frame(&self) -> CaptureResult<Frame> {
            Err(CaptureError::NoFrame)
        }
    }

    /// Counts lifecycle calls; callbacks are kept so tests can flush by hand
    #[derive(Default)]
    struct Tally {
        created: usize,
        started: usize,
        stopped: usize,
        callbacks: Vec<DataCallback>,
        /// Recorders numbered up to this one have died on their own
        dead_through: usize,
    }

    #[derive(Default)]
    struct FakeFactory {
        tally: Arc<Mutex<Tally>>,
        fail_start: bool,
    }

    struct FakeRecorder {
        tally: Arc<Mutex<Tally>>,
        number: usize,
        fail_start: bool,
        live: bool,
    }

    impl Recorder for FakeRecorder {
        fn start(&mut self) -> RecordingResult<()> {
            if self.fail_start {
                return Err(RecordingError::Ffmpeg("boom".to_string()));
            }
            self.live = true;
            self.tally.lock().started += 1;
            Ok(())
        }
        fn stop(&mut self) -> RecordingResult<()> {
            self.live = false;
            self.tally.lock().stopped += 1;
            Ok(())
        }
        fn is_recording(&self) -> bool {
            self.live && self.number > self.tally.lock().dead_through
        }
    }

    impl RecorderFactory for FakeFactory {
        fn create(
            &self,
            _source: Arc<dyn FrameSource>,
            on_data: DataCallback,
        ) -> RecordingResult<Box<dyn Recorder>> {
            let mut tally = self.tally.lock();
            tally.created += 1;
            tally.callbacks.push(on_data);
            Ok(Box::new(FakeRecorder {
                tally: self.tally.clone(),
                number: tally.created,
                fail_start: self.fail_start,
                live: false,
            }))
        }
    }

    fn state_with(factory: FakeFactory) -> (ControllerState, Arc<Mutex<Tally>>, ClipRegistry) {
        let tally = factory.tally.clone();
        let registry = ClipRegistry::new();
        let (event_tx, _) = broadcast::channel(100);
        let state = ControllerState::new(
            10,
            Arc::new(NullSource),
            Arc::new(factory),
            registry.clone(),
            event_tx,
        );
        (state, tally, registry)
    }

    #[test]
    fn test_double_start_creates_one_recorder() {
        let (mut state, tally, _) = state_with(FakeFactory::default());

        state.start_recording();
        state.start_recording();

        let tally = tally.lock();
        assert_eq!(tally.created, 1);
        assert_eq!(tally.started, 1);
        assert_eq!(tally.callbacks.len(), 1);
        assert!(state.is_recording());
    }

    #[test]
    fn test_stop_while_idle_is_noop() {
        let (mut state, tally, _) = state_with(FakeFactory::default());
        state.stop_recording();
        assert_eq!(tally.lock().stopped, 0);
        assert!(!state.is_recording());
    }

    #[test]
    fn test_negatives_without_positive_never_start() {
        let (mut state, tally, _) = state_with(FakeFactory::default());

        for _ in 0..25 {
            assert_eq!(state.apply(false), Decision::Idle);
        }

        assert_eq!(tally.lock().created, 0);
        assert!(state.history().is_empty());
    }

    #[test]
    fn test_hysteresis_holds_until_positive_evicted() {
        let (mut state, tally, _) = state_with(FakeFactory::default());

        assert_eq!(state.apply(true), Decision::Detected);
        for i in 0..10 {
            assert_eq!(state.apply(false), Decision::Holding, "negative #{}", i + 1);
            assert!(state.is_recording());
        }

        // The positive was pushed out by the 10th negative
        assert_eq!(state.apply(false), Decision::Idle);
        assert!(!state.is_recording());
        assert!(state.history().is_empty());
        assert_eq!(tally.lock().stopped, 1);
    }

    #[test]
    fn test_recording_matches_window_for_mixed_sequence() {
        let (mut state, _, _) = state_with(FakeFactory::default());
        let outcomes = [
            false, true, false, false, true, false, false, false, false, false, false, false,
            false, false, false, false, false, true, false,
        ];

        let mut window: Vec<bool> = Vec::new();
        for &found in &outcomes {
            let had_positive = window.iter().any(|&s| s);
            state.apply(found);

            let expect_recording = found || had_positive;
            assert_eq!(state.is_recording(), expect_recording);

            if expect_recording {
                window.push(found);
                if window.len() > 10 {
                    window.remove(0);
                }
            } else {
                window.clear();
            }
        }
    }

    #[test]
    fn test_stop_resets_history() {
        let (mut state, _, _) = state_with(FakeFactory::default());
        state.apply(true);
        state.apply(false);
        assert_eq!(state.history().len(), 2);

        state.stop_recording();
        assert!(state.history().is_empty());

        // A fresh negative sees no pre-stop history
        assert_eq!(state.apply(false), Decision::Idle);
        assert!(!state.is_recording());
    }

    #[test]
    fn test_failed_start_keeps_no_recorder() {
        let (mut state, tally, _) = state_with(FakeFactory {
            fail_start: true,
            ..Default::default()
        });

        assert_eq!(state.apply(true), Decision::Detected);
        assert!(!state.is_recording());
        assert_eq!(tally.lock().created, 1);

        // Next detection retries
        state.apply(true);
        assert_eq!(tally.lock().created, 2);
    }

    #[test]
    fn test_late_flush_registers_after_new_session() {
        let (mut state, tally, registry) = state_with(FakeFactory::default());

        state.start_recording();
        state.stop_recording();
        state.start_recording();

        let callbacks = tally.lock().callbacks.clone();
        assert_eq!(callbacks.len(), 2);

        // First session's data arrives while the second is live
        (callbacks[0])(ClipData::Buffer(Arc::new(vec![1, 2, 3])));
        assert_eq!(registry.len(), 1);
        assert!(state.is_recording());

        state.stop_recording();
        (callbacks[1])(ClipData::Buffer(Arc::new(vec![4])));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_dead_recorder_is_replaced() {
        let (mut state, tally, _) = state_with(FakeFactory::default());
        let mut events = state.event_tx.subscribe();

        assert_eq!(state.apply(true), Decision::Detected);
        assert_eq!(tally.lock().created, 1);

        // The encoder behind the first recorder exits by itself
        tally.lock().dead_through = 1;

        assert_eq!(state.apply(false), Decision::Holding);
        assert!(state.is_recording());
        assert_eq!(tally.lock().created, 2);
        assert_eq!(state.history().len(), 2);

        let mut failures = 0;
        while let Ok(event) = events.try_recv() {
            if let ControllerEvent::RecorderFailed { message } = event {
                assert!(message.contains("unexpectedly"));
                failures += 1;
            }
        }
        assert_eq!(failures, 1);
    }

    #[test]
    fn test_dead_recorder_is_dropped_when_idle() {
        let (mut state, tally, _) = state_with(FakeFactory::default());

        state.start_recording();
        tally.lock().dead_through = 1;

        // Nothing in the window: the dead recorder goes and no new one starts
        assert_eq!(state.apply(false), Decision::Idle);
        assert!(!state.is_recording());
        assert_eq!(tally.lock().created, 1);
        assert_eq!(tally.lock().stopped, 0);
    }

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_value(ControllerEvent::Decision {
            decision: Decision::Holding,
            iteration: 3,
        })
        .unwrap();
        assert_eq!(json["type"], "decision");
        assert_eq!(json["decision"], "holding");
        assert_eq!(json["iteration"], 3);

        let json = serde_json::to_value(ControllerEvent::RecorderFailed {
            message: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "recorderFailed");
        assert_eq!(json["message"], "boom");
    }
}
