//! FFmpeg-backed frame source
//!
//! FFmpeg decodes the configured input to raw RGBA on stdout. A reader thread keeps
//! only the most recent frame, which is what the detector samples.

use super::traits::{CaptureError, CaptureResult, Frame, FrameSource, Resolution};
use crate::config::SourceConfig;
use parking_lot::{Condvar, Mutex};
use std::io::{BufReader, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Latest decoded frame plus a flag flipped when the decoder exits
#[derive(Default)]
struct LatestFrame {
    frame: Option<Frame>,
    closed: bool,
}

pub struct FfmpegFrameSource {
    id: String,
    resolution: Resolution,
    fps: u32,
    latest: Arc<(Mutex<LatestFrame>, Condvar)>,
    running: Arc<AtomicBool>,
    process: Mutex<Option<Child>>,
    reader_thread: Option<std::thread::JoinHandle<()>>,
}

impl FfmpegFrameSource {
    /// Start decoding the input and wait for the first frame
    pub fn open(config: &SourceConfig) -> CaptureResult<Self> {
        let resolution = Resolution {
            width: config.width,
            height: config.height,
        };
        let args = build_input_args(config);

        tracing::info!("Opening FFmpeg source: {:?}", args);

        let mut process = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CaptureError::Ffmpeg(format!("Failed to start FFmpeg source: {}", e)))?;

        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| CaptureError::Ffmpeg("Failed to capture FFmpeg stdout".to_string()))?;

        let latest = Arc::new((Mutex::new(LatestFrame::default()), Condvar::new()));
        let running = Arc::new(AtomicBool::new(true));

        let reader_thread = {
            let latest = latest.clone();
            let running = running.clone();
            std::thread::Builder::new()
                .name("ffmpeg-source".to_string())
                .spawn(move || read_frames(stdout, resolution, latest, running))?
        };

        let mut source = Self {
            id: config.input.clone(),
            resolution,
            fps: config.fps,
            latest,
            running,
            process: Mutex::new(Some(process)),
            reader_thread: Some(reader_thread),
        };

        // Acquisition only succeeds once the device actually delivers
        source.wait_first_frame(Duration::from_millis(config.acquire_timeout_ms))?;

        tracing::info!(
            "FFmpeg source ready: {} {}x{} @ {}fps",
            source.id,
            resolution.width,
            resolution.height,
            source.fps
        );
        Ok(source)
    }

    fn wait_first_frame(&mut self, timeout: Duration) -> CaptureResult<()> {
        let (lock, cvar) = &*self.latest;
        let mut latest = lock.lock();
        if latest.frame.is_none() && !latest.closed {
            let _ = cvar.wait_while_for(
                &mut latest,
                |l| l.frame.is_none() && !l.closed,
                timeout,
            );
        }

        if latest.frame.is_some() {
            return Ok(());
        }
        let closed = latest.closed;
        drop(latest);
        self.shutdown();

        if closed {
            Err(CaptureError::Ffmpeg(format!(
                "FFmpeg exited before delivering a frame from {}",
                self.id
            )))
        } else {
            Err(CaptureError::AcquireTimeout(timeout.as_millis() as u64))
        }
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(mut process) = self.process.lock().take() {
            let _ = process.kill();
            let _ = process.wait();
        }
        if let Some(handle) = self.reader_thread.take() {
            let _ = handle.join();
        }
    }
}

impl FrameSource for FfmpegFrameSource {
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
        let latest = self.latest.0.lock();
        match (&latest.frame, latest.closed) {
            (_, true) => Err(CaptureError::Closed),
            (Some(frame), false) => Ok(frame.clone()),
            (None, false) => Err(CaptureError::NoFrame),
        }
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Build the FFmpeg argument list decoding `config.input` to fixed-size RGBA
fn build_input_args(config: &SourceConfig) -> Vec<String> {
    let mut args = vec!["-hide_banner".to_string(), "-loglevel".to_string(), "error".to_string()];

    if let Some(format) = &config.input_format {
        args.extend(["-f".to_string(), format.clone()]);
        // Device demuxers accept a capture size and rate hint
        args.extend([
            "-framerate".to_string(),
            config.fps.to_string(),
            "-video_size".to_string(),
            format!("{}x{}", config.width, config.height),
        ]);
    }

    args.extend([
        "-i".to_string(),
        config.input.clone(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgba".to_string(),
        // IMPORTANT: force the output size so frames are exactly width*height*4 bytes
        "-s".to_string(),
        format!("{}x{}", config.width, config.height),
        "-r".to_string(),
        config.fps.to_string(),
        "-".to_string(),
    ]);

    args
}

fn read_frames(
    stdout: ChildStdout,
    resolution: Resolution,
    latest: Arc<(Mutex<LatestFrame>, Condvar)>,
    running: Arc<AtomicBool>,
) {
    let frame_size = resolution.rgba_frame_size();
    let mut reader = BufReader::with_capacity(frame_size * 2, stdout);
    let mut sequence: u64 = 0;

    while running.load(Ordering::SeqCst) {
        let mut buffer = vec![0u8; frame_size];
        match reader.read_exact(&mut buffer) {
            Ok(()) => {
                let (lock, cvar) = &*latest;
                lock.lock().frame = Some(Frame::new(resolution, buffer, sequence));
                cvar.notify_all();
                sequence += 1;
            }
            Err(e) => {
                if e.kind() != std::io::ErrorKind::UnexpectedEof {
                    tracing::warn!("FFmpeg source read failed: {}", e);
                }
                break;
            }
        }
    }

    let (lock, cvar) = &*latest;
    lock.lock().closed = true;
    cvar.notify_all();
    tracing::debug!("FFmpeg source reader stopped after {} frames", sequence);
}
