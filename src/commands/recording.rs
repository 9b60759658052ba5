//! Detection and recording commands

use crate::app::PresenceApp;
use crate::capture::{list_cameras, CameraInfo};
use crate::config::AppConfig;
use crate::controller::{ClipSummary, ControllerStatus, RecordingController};
use crate::utils::{AppError, ErrorResponse};
use tauri::{AppHandle, Emitter, State};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;

/// Application state for detection
pub struct DetectionState {
    pub config: AppConfig,
    pub app: Mutex<Option<PresenceApp>>,
}

impl DetectionState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            app: Mutex::new(None),
        }
    }

    /// Halt detection and wait for clips still encoding
    pub async fn shutdown(&self) {
        let slot = self.app.lock().await;
        if let Some(presence) = slot.as_ref() {
            presence.shutdown().await;
        }
    }
}

/// Relay controller events to the webview until the controller goes away
fn forward_events(app: AppHandle, controller: &RecordingController) {
    let mut rx = controller.subscribe();
    tauri::async_runtime::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = app.emit("controller-event", &event) {
                        tracing::warn!("Failed to emit controller event: {}", e);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event forwarder lagged, {} event(s) dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Get list of available cameras/webcams
#[tauri::command]
pub async fn get_cameras() -> Result<Vec<CameraInfo>, ErrorResponse> {
    Ok(list_cameras())
}

/// Start detection, acquiring camera and detector on first use
#[tauri::command]
pub async fn start_detection(
    app: AppHandle,
    state: State<'_, DetectionState>,
) -> Result<bool, ErrorResponse> {
    let mut slot = state.app.lock().await;

    if slot.is_none() {
        // Acquisition waits for the first camera frame; keep it off the async workers
        let config = state.config.clone();
        let launched = tokio::task::spawn_blocking(move || PresenceApp::launch(&config))
            .await
            .map_err(|e| AppError::NotReady(format!("Launch task failed: {}", e)))??;
        forward_events(app, launched.controller());
        *slot = Some(launched);
    }

    match slot.as_ref() {
        Some(presence) => Ok(presence.controller().start()),
        None => Err(AppError::NotReady("controller unavailable".to_string()).into()),
    }
}

/// Request detection to stop after the current iteration
#[tauri::command]
pub async fn stop_detection(state: State<'_, DetectionState>) -> Result<bool, ErrorResponse> {
    let slot = state.app.lock().await;
    Ok(slot
        .as_ref()
        .map(|presence| presence.controller().stop())
        .unwrap_or(false))
}

/// Get current controller status; `None` before the first start
#[tauri::command]
pub async fn get_controller_status(
    state: State<'_, DetectionState>,
) -> Result<Option<ControllerStatus>, ErrorResponse> {
    let slot = state.app.lock().await;
    Ok(slot.as_ref().map(|presence| presence.controller().status()))
}

/// Get recorded clips in arrival order
#[tauri::command]
pub async fn get_clips(state: State<'_, DetectionState>) -> Result<Vec<ClipSummary>, ErrorResponse> {
    let slot = state.app.lock().await;
    Ok(slot
        .as_ref()
        .map(|presence| presence.controller().registry().summaries())
        .unwrap_or_default())
}
