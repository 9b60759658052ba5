//! Application wiring
//!
//! Acquires the camera, launches the detector and builds the controller from an
//! `AppConfig`. Shared by the headless binary and the desktop commands.

use crate::capture::{CaptureResult, FfmpegFrameSource, FrameSource};
use crate::config::{AppConfig, SourceBackend, SourceConfig};
use crate::controller::{
    ImmediateScheduler, IntervalScheduler, RecordingController, RefreshScheduler,
};
use crate::detector::CommandDetector;
use crate::recorder::FfmpegRecorderFactory;
use crate::utils::AppResult;
use std::sync::Arc;

pub struct PresenceApp {
    controller: RecordingController,
    factory: Arc<FfmpegRecorderFactory>,
}

impl PresenceApp {
    /// Acquire every collaborator. Fails before any polling can start.
    ///
    /// Must be called from within a tokio runtime.
    pub fn launch(config: &AppConfig) -> AppResult<Self> {
        config.validate()?;

        let source = open_source(&config.source)?;
        let detector = Arc::new(CommandDetector::spawn(&config.detector)?);
        let factory = Arc::new(FfmpegRecorderFactory::new(config.recorder.clone()));
        // A zero interval polls back to back, paced only by the detector
        let scheduler: Arc<dyn RefreshScheduler> = if config.controller.refresh_interval_ms == 0 {
            Arc::new(ImmediateScheduler)
        } else {
            Arc::new(IntervalScheduler::new(config.controller.refresh_interval()))
        };

        let controller = RecordingController::new(
            config.controller.clone(),
            source,
            detector,
            factory.clone(),
            scheduler,
        );

        Ok(Self { controller, factory })
    }

    pub fn controller(&self) -> &RecordingController {
        &self.controller
    }

    /// Halt polling and wait for outstanding clips to be registered
    pub async fn shutdown(&self) {
        self.controller.stop_and_wait().await;
        let pending = self.factory.pending();
        if pending > 0 {
            tracing::info!("{} clip(s) still encoding", pending);
        }
        self.factory.flush().await;
        tracing::info!(
            "Shutdown complete, {} clip(s) recorded",
            self.controller.registry().len()
        );
    }
}

fn open_source(config: &SourceConfig) -> CaptureResult<Arc<dyn FrameSource>> {
    match config.backend {
        SourceBackend::Ffmpeg => Ok(Arc::new(FfmpegFrameSource::open(config)?)),
        #[cfg(feature = "webcam")]
        SourceBackend::Webcam => {
            let timeout = std::time::Duration::from_millis(config.acquire_timeout_ms);
            Ok(Arc::new(crate::capture::webcam::WebcamFrameSource::open(
                Some(config.input.as_str()),
                timeout,
            )?))
        }
        #[cfg(not(feature = "webcam"))]
        SourceBackend::Webcam => Err(crate::capture::CaptureError::DeviceNotFound(
            "webcam backend not compiled in".to_string(),
        )),
    }
}
