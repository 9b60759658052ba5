//! Native webcam source using nokhwa
//!
//! The camera handle is not `Send`, so it lives on its own capture thread which
//! decodes each frame to RGBA and publishes it as the latest frame.

use super::traits::{CameraInfo, CaptureError, CaptureResult, Frame, FrameSource, Resolution};
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

/// Get list of available cameras
pub fn get_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .map(|info| {
                let id = match info.index() {
                    CameraIndex::Index(i) => i.to_string(),
                    CameraIndex::String(s) => s.to_string(),
                };

                CameraInfo {
                    id,
                    name: info.human_name().to_string(),
                    supported_resolutions: vec![
                        Resolution {
                            width: 1280,
                            height: 720,
                        },
                        Resolution {
                            width: 640,
                            height: 480,
                        },
                    ],
                }
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

fn camera_index(device_id: Option<&str>) -> CameraIndex {
    match device_id {
        Some(id) => match id.parse::<u32>() {
            Ok(idx) => CameraIndex::Index(idx),
            Err(_) => CameraIndex::String(id.to_string()),
        },
        None => CameraIndex::Index(0),
    }
}

pub struct WebcamFrameSource {
    id: String,
    resolution: Resolution,
    fps: u32,
    latest: Arc<Mutex<Option<Frame>>>,
    running: Arc<AtomicBool>,
    capture_thread: Option<std::thread::JoinHandle<()>>,
}

impl WebcamFrameSource {
    /// Open the camera and block until its stream is running
    pub fn open(device_id: Option<&str>, acquire_timeout: Duration) -> CaptureResult<Self> {
        let index = camera_index(device_id);
        let latest: Arc<Mutex<Option<Frame>>> = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = mpsc::channel::<CaptureResult<(Resolution, u32)>>();

        let handle = {
            let latest = latest.clone();
            let running = running.clone();
            let index = index.clone();
            std::thread::Builder::new()
                .name("webcam-source".to_string())
                .spawn(move || capture_loop(index, latest, running, ready_tx))?
        };

        let (resolution, fps) = match ready_rx.recv_timeout(acquire_timeout) {
            Ok(Ok(opened)) => opened,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                running.store(false, Ordering::SeqCst);
                return Err(CaptureError::AcquireTimeout(acquire_timeout.as_millis() as u64));
            }
        };

        tracing::info!(
            "Webcam {:?} opened: {}x{} @ {}fps",
            index,
            resolution.width,
            resolution.height,
            fps
        );

        Ok(Self {
            id: format!("webcam:{}", index),
            resolution,
            fps,
            latest,
            running,
            capture_thread: Some(handle),
        })
    }
}

fn capture_loop(
    index: CameraIndex,
    latest: Arc<Mutex<Option<Frame>>>,
    running: Arc<AtomicBool>,
    ready_tx: mpsc::Sender<CaptureResult<(Resolution, u32)>>,
) {
    let format = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

    let mut camera = match Camera::new(index.clone(), format) {
        Ok(c) => c,
        Err(e) => {
            let _ = ready_tx.send(Err(CaptureError::DeviceNotFound(format!("{:?}: {}", index, e))));
            return;
        }
    };

    if let Err(e) = camera.open_stream() {
        let _ = ready_tx.send(Err(CaptureError::DeviceNotFound(format!(
            "Failed to open camera stream: {}",
            e
        ))));
        return;
    }

    let camera_format = camera.camera_format();
    let resolution = Resolution {
        width: camera_format.resolution().width(),
        height: camera_format.resolution().height(),
    };
    let _ = ready_tx.send(Ok((resolution, camera_format.frame_rate())));

    let mut sequence: u64 = 0;
    while running.load(Ordering::SeqCst) {
        // Blocks until the camera delivers; the camera controls the timing
        let buffer = match camera.frame() {
            Ok(buffer) => buffer,
            Err(e) => {
                tracing::debug!("Failed to capture frame: {:?}", e);
                continue;
            }
        };

        match buffer.decode_image::<RgbAFormat>() {
            Ok(image) => {
                let decoded = Resolution {
                    width: image.width(),
                    height: image.height(),
                };
                *latest.lock() = Some(Frame::new(decoded, image.into_raw(), sequence));
                sequence += 1;
            }
            Err(e) => tracing::debug!("Failed to decode frame: {:?}", e),
        }
    }

    if let Err(e) = camera.stop_stream() {
        tracing::warn!("Error stopping camera stream: {:?}", e);
    }
    tracing::info!("Webcam capture thread stopped after {} frames", sequence);
}

impl FrameSource for WebcamFrameSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn fps(&self) -> u32 {
        self.fps
    }

    fn current_frame(&self) -> CaptureResult<Frame> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(CaptureError::Closed);
        }
        self.latest.lock().clone().ok_or(CaptureError::NoFrame)
    }
}

impl Drop for WebcamFrameSource {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.capture_thread.take() {
            let _ = handle.join();
        }
    }
}
