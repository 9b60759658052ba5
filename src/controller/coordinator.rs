//! Recording controller
//!
//! Owns the poll loop: sample a frame, await the detector, let `ControllerState`
//! decide, await the next refresh tick, repeat until stopped.

use super::registry::ClipRegistry;
use super::scheduler::RefreshScheduler;
use super::state::{ControllerEvent, ControllerState, ControllerStatus, RunState};
use crate::capture::FrameSource;
use crate::config::ControllerConfig;
use crate::detector::{contains_class, Detector, DetectorError};
use crate::recorder::RecorderFactory;
use parking_lot::Mutex as SyncMutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

struct Shared {
    config: ControllerConfig,
    source: Arc<dyn FrameSource>,
    detector: Arc<dyn Detector>,
    scheduler: Arc<dyn RefreshScheduler>,
    registry: ClipRegistry,
    event_tx: broadcast::Sender<ControllerEvent>,

    /// Held by a poll loop for its whole run, which serializes runs
    state: Mutex<ControllerState>,

    /// User intent
    should_record: AtomicBool,
    /// Bumped on every start; a loop from an older run halts
    generation: AtomicU64,
    recording: Arc<AtomicBool>,
    decisions: AtomicU64,
    task: SyncMutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.should_record.load(Ordering::SeqCst)
            && self.generation.load(Ordering::SeqCst) == generation
    }

    fn emit(&self, event: ControllerEvent) {
        let _ = self.event_tx.send(event);
    }

    /// One iteration between the loop-head check and the refresh tick
    async fn poll_once(&self, state: &mut ControllerState) {
        let frame = match self.source.current_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Skipping iteration, no frame: {}", e);
                self.emit(ControllerEvent::DetectionFailed {
                    message: e.to_string(),
                });
                return;
            }
        };

        let timeout = self.config.detect_timeout();
        let predictions = match tokio::time::timeout(timeout, self.detector.detect(&frame)).await {
            Ok(Ok(predictions)) => predictions,
            Ok(Err(e)) => {
                tracing::warn!("Detection failed: {}", e);
                self.emit(ControllerEvent::DetectionFailed {
                    message: e.to_string(),
                });
                return;
            }
            Err(_) => {
                let e = DetectorError::Timeout(self.config.detect_timeout_ms);
                tracing::warn!("{}", e);
                self.emit(ControllerEvent::DetectionFailed {
                    message: e.to_string(),
                });
                return;
            }
        };

        let found = contains_class(&predictions, &self.config.target_class);
        if found {
            tracing::debug!("Found {}", self.config.target_class);
        }

        let decision = state.apply(found);
        let iteration = self.decisions.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(
            "Iteration {} on frame #{}: {:?} (window {}/{})",
            iteration,
            frame.sequence,
            decision,
            state.history().len(),
            state.history().capacity()
        );
        self.emit(ControllerEvent::Decision { decision, iteration });
    }
}

async fn run_poll_loop(shared: Arc<Shared>, generation: u64) {
    let mut state = shared.state.lock().await;
    tracing::info!("Poll loop {} running", generation);

    loop {
        if !shared.is_current(generation) {
            state.halt();
            break;
        }

        shared.poll_once(&mut state).await;
        shared.scheduler.next_tick().await;
    }

    tracing::info!("Poll loop {} halted", generation);
    shared.emit(ControllerEvent::Stopped);
}

/// Host-facing handle driving detection-triggered recording
///
/// Cloning yields another handle to the same controller.
#[derive(Clone)]
pub struct RecordingController {
    shared: Arc<Shared>,
}

impl RecordingController {
    pub fn new(
        config: ControllerConfig,
        source: Arc<dyn FrameSource>,
        detector: Arc<dyn Detector>,
        factory: Arc<dyn RecorderFactory>,
        scheduler: Arc<dyn RefreshScheduler>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let registry = ClipRegistry::new();
        let state = ControllerState::new(
            config.history_capacity,
            source.clone(),
            factory,
            registry.clone(),
            event_tx.clone(),
        );
        let recording = state.recording_flag();

        tracing::info!(
            "Controller ready: source={}, target={}, window={}",
            source.id(),
            config.target_class,
            config.history_capacity
        );

        Self {
            shared: Arc::new(Shared {
                config,
                source,
                detector,
                scheduler,
                registry,
                event_tx,
                state: Mutex::new(state),
                should_record: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                recording,
                decisions: AtomicU64::new(0),
                task: SyncMutex::new(None),
            }),
        }
    }

    /// Begin polling. Returns false (and does nothing) if already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        if self.shared.should_record.swap(true, Ordering::SeqCst) {
            return false;
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!("Starting detection (run {})", generation);

        let handle = tokio::spawn(run_poll_loop(self.shared.clone(), generation));
        *self.shared.task.lock() = Some(handle);
        self.shared.emit(ControllerEvent::Started);
        true
    }

    /// Request the poll loop to halt. Returns false if it was not running.
    ///
    /// The loop notices at its next iteration; an in-flight detection still
    /// completes and produces one final decision.
    pub fn stop(&self) -> bool {
        if !self.shared.should_record.swap(false, Ordering::SeqCst) {
            return false;
        }
        tracing::info!("Stopping detection");
        true
    }

    /// Stop and wait until the poll loop has released the recorder
    pub async fn stop_and_wait(&self) {
        self.stop();
        let handle = self.shared.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Poll loop task failed: {}", e);
            }
        }
    }

    pub fn run_state(&self) -> RunState {
        if self.shared.should_record.load(Ordering::SeqCst) {
            RunState::Running
        } else {
            RunState::Stopped
        }
    }

    pub fn is_start_enabled(&self) -> bool {
        self.run_state() == RunState::Stopped
    }

    pub fn is_stop_enabled(&self) -> bool {
        self.run_state() == RunState::Running
    }

    pub fn is_recording(&self) -> bool {
        self.shared.recording.load(Ordering::SeqCst)
    }

    /// Number of decisions made since creation
    pub fn decisions(&self) -> u64 {
        self.shared.decisions.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ControllerStatus {
        let run_state = self.run_state();
        ControllerStatus {
            run_state,
            is_recording: self.is_recording(),
            is_start_enabled: self.is_start_enabled(),
            is_stop_enabled: self.is_stop_enabled(),
            decisions: self.decisions(),
            clip_count: self.shared.registry.len(),
        }
    }

    /// Read access to produced clips
    pub fn registry(&self) -> &ClipRegistry {
        &self.shared.registry
    }

    /// Subscribe to controller events
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.shared.event_tx.subscribe()
    }
}
