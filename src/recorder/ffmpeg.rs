//! FFmpeg recorder
//!
//! Each recording session spawns an encoder thread that samples the shared frame
//! source at the configured rate and pipes raw RGBA into FFmpeg. `stop()` only
//! signals the thread; encoding is finished in the background and the clip is
//! handed to the data callback once FFmpeg exits.

use super::traits::{ClipData, DataCallback, Recorder, RecorderFactory, RecordingError, RecordingResult};
use crate::capture::{FrameSource, Resolution};
use crate::config::RecorderConfig;
use chrono::Local;
use parking_lot::Mutex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Creates FFmpeg recorders and tracks their background finalizers
pub struct FfmpegRecorderFactory {
    config: RecorderConfig,
    program: PathBuf,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl FfmpegRecorderFactory {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            program: PathBuf::from("ffmpeg"),
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Use a specific FFmpeg executable instead of the one on `PATH`
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Number of stopped recorders still encoding
    pub fn pending(&self) -> usize {
        self.pending.lock().iter().filter(|h| !h.is_finished()).count()
    }

    /// Wait for every stopped recorder to finish and deliver its clip
    pub async fn flush(&self) {
        let handles: Vec<JoinHandle<()>> = self.pending.lock().drain(..).collect();
        if handles.is_empty() {
            return;
        }

        tracing::info!("Waiting for {} clip(s) to finish encoding", handles.len());
        let joined = tokio::task::spawn_blocking(move || {
            for handle in handles {
                if handle.join().is_err() {
                    tracing::error!("Encoder thread panicked");
                }
            }
        })
        .await;

        if let Err(e) = joined {
            tracing::error!("Failed to join encoder threads: {}", e);
        }
    }
}

impl RecorderFactory for FfmpegRecorderFactory {
    fn create(
        &self,
        source: Arc<dyn FrameSource>,
        on_data: DataCallback,
    ) -> RecordingResult<Box<dyn Recorder>> {
        if self.config.fps == 0 {
            return Err(RecordingError::ConfigurationError(
                "recorder fps must be non-zero".to_string(),
            ));
        }

        Ok(Box::new(FfmpegRecorder {
            config: self.config.clone(),
            program: self.program.clone(),
            source,
            on_data,
            running: Arc::new(AtomicBool::new(false)),
            encoder_thread: None,
            pending: self.pending.clone(),
        }))
    }
}

pub struct FfmpegRecorder {
    config: RecorderConfig,
    program: PathBuf,
    source: Arc<dyn FrameSource>,
    on_data: DataCallback,
    running: Arc<AtomicBool>,
    encoder_thread: Option<JoinHandle<()>>,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Recorder for FfmpegRecorder {
    fn start(&mut self) -> RecordingResult<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(RecordingError::AlreadyRecording);
        }

        std::fs::create_dir_all(&self.config.output_dir)?;
        let output_file = clip_path(&self.config.output_dir);
        let resolution = self.source.resolution();
        // Sampling faster than the source delivers only duplicates frames
        let fps = self.config.fps.min(self.source.fps().max(1));
        let args = build_encoder_args(resolution, fps, &self.config, &output_file);

        tracing::info!("Starting FFmpeg recorder: {:?}", args);

        let process = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RecordingError::Ffmpeg(format!("Failed to start FFmpeg encoder: {}", e)))?;

        self.running.store(true, Ordering::SeqCst);

        let session = EncoderSession {
            process,
            source: self.source.clone(),
            resolution,
            fps,
            output_file,
            on_data: self.on_data.clone(),
            running: self.running.clone(),
        };

        let handle = std::thread::Builder::new()
            .name("clip-encoder".to_string())
            .spawn(move || session.run());

        match handle {
            Ok(handle) => {
                self.encoder_thread = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(RecordingError::Io(e))
            }
        }
    }

    fn stop(&mut self) -> RecordingResult<()> {
        let was_running = self.running.swap(false, Ordering::SeqCst);

        // Finalization continues in the background; keep the handle for flush()
        self.hand_off_encoder();

        if !was_running {
            return Err(RecordingError::NotRecording);
        }
        tracing::info!("FFmpeg recorder signalled to stop");
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl FfmpegRecorder {
    /// Move the encoder thread to the factory's pending list, pruning finished ones
    fn hand_off_encoder(&mut self) {
        let mut pending = self.pending.lock();
        pending.retain(|h| !h.is_finished());
        if let Some(handle) = self.encoder_thread.take() {
            pending.push(handle);
        }
    }
}

impl Drop for FfmpegRecorder {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.hand_off_encoder();
    }
}

/// State moved onto the encoder thread
struct EncoderSession {
    process: Child,
    source: Arc<dyn FrameSource>,
    resolution: Resolution,
    fps: u32,
    output_file: PathBuf,
    on_data: DataCallback,
    running: Arc<AtomicBool>,
}

impl EncoderSession {
    fn run(self) {
        let running = self.running.clone();
        self.encode();
        // The encoder may have ended on its own; the recorder must not report live
        running.store(false, Ordering::SeqCst);
    }

    fn encode(mut self) {
        let frame_interval = Duration::from_secs_f64(1.0 / self.fps.max(1) as f64);
        let expected_size = self.resolution.rgba_frame_size();
        let mut frames_written: u64 = 0;
        let mut next_frame = Instant::now();

        if let Some(mut stdin) = self.process.stdin.take() {
            while self.running.load(Ordering::SeqCst) {
                if let Ok(Some(status)) = self.process.try_wait() {
                    tracing::error!("FFmpeg encoder exited early: {}", status);
                    break;
                }

                match self.source.current_frame() {
                    Ok(frame) if frame.data.len() == expected_size => {
                        if let Err(e) = stdin.write_all(&frame.data) {
                            tracing::error!("Failed to write frame to encoder: {}", e);
                            break;
                        }
                        frames_written += 1;
                    }
                    Ok(frame) => {
                        tracing::warn!(
                            "Skipping frame of {} bytes (expected {})",
                            frame.data.len(),
                            expected_size
                        );
                    }
                    Err(e) => tracing::debug!("No frame for encoder: {}", e),
                }

                next_frame += frame_interval;
                let now = Instant::now();
                if next_frame > now {
                    std::thread::sleep(next_frame - now);
                } else {
                    next_frame = now;
                }
            }
            // Close stdin to signal EOF to FFmpeg
            drop(stdin);
        }

        let output = match self.process.wait_with_output() {
            Ok(output) => output,
            Err(e) => {
                tracing::error!("Failed to wait for FFmpeg: {}", e);
                return;
            }
        };

        if !output.status.success() || frames_written == 0 {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(
                "FFmpeg recorder produced no clip (status {}, {} frames): {}",
                output.status,
                frames_written,
                stderr.trim()
            );
            let _ = std::fs::remove_file(&self.output_file);
            return;
        }

        tracing::info!(
            "Clip finished: {} frames -> {:?}",
            frames_written,
            self.output_file
        );
        (self.on_data)(ClipData::File(self.output_file));
    }
}

/// Unique output path for a new clip
fn clip_path(output_dir: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    output_dir.join(format!("clip-{}-{}.mp4", stamp, &suffix[..8]))
}

fn build_encoder_args(
    resolution: Resolution,
    fps: u32,
    config: &RecorderConfig,
    output_file: &Path,
) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgba".to_string(),
        "-s".to_string(),
        format!("{}x{}", resolution.width, resolution.height),
        "-r".to_string(),
        fps.to_string(),
        "-i".to_string(),
        "-".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        config.preset.clone(),
        "-crf".to_string(),
        config.crf.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        output_file.to_string_lossy().to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureError, CaptureResult, Frame};

    struct NoFrames;

    impl FrameSource for NoFrames {
        fn id(&self) -> &str {
            "none"
        }
        fn resolution(&self) -> Resolution {
            Resolution { width: 2, height: 2 }
        }
        fn fps(&self) -> u32 {
            10
        }
        fn current_frame(&self) -> CaptureResult<Frame> {
            Err(CaptureError::NoFrame)
        }
    }

    #[test]
    fn test_encoder_args() {
        let config = RecorderConfig {
            crf: 28,
            fps: 30,
            ..Default::default()
        };
        let args = build_encoder_args(
            Resolution {
                width: 640,
                height: 480,
            },
            12,
            &config,
            Path::new("/tmp/clip.mp4"),
        );

        assert!(args.contains(&"640x480".to_string()));
        assert!(args.contains(&"28".to_string()));
        assert!(args.contains(&"12".to_string()));
        assert!(!args.contains(&"30".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/clip.mp4"));
    }

    #[test]
    fn test_clip_paths_are_unique() {
        let dir = Path::new("clips");
        let a = clip_path(dir);
        let b = clip_path(dir);

        assert_ne!(a, b);
        assert!(a.starts_with(dir));
        assert_eq!(a.extension().and_then(|e| e.to_str()), Some("mp4"));
    }

    #[test]
    fn test_stop_without_start_is_not_recording() {
        let factory = FfmpegRecorderFactory::new(RecorderConfig::default());
        let mut recorder = factory
            .create(Arc::new(NoFrames), Arc::new(|_: ClipData| {}))
            .unwrap();

        assert!(!recorder.is_recording());
        assert!(matches!(recorder.stop(), Err(RecordingError::NotRecording)));
        assert_eq!(factory.pending(), 0);
    }

    #[test]
    fn test_zero_fps_is_rejected() {
        let factory = FfmpegRecorderFactory::new(RecorderConfig {
            fps: 0,
            ..Default::default()
        });
        let result = factory.create(Arc::new(NoFrames), Arc::new(|_: ClipData| {}));
        assert!(matches!(result, Err(RecordingError::ConfigurationError(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_dead_encoder_is_not_live() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("ffmpeg");
        std::fs::write(&program, "#!/bin/sh\nexit 1\n").unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

        let factory = FfmpegRecorderFactory::new(RecorderConfig {
            output_dir: dir.path().join("clips"),
            ..Default::default()
        })
        .with_program(&program);
        let clips = Arc::new(Mutex::new(Vec::new()));
        let sink = clips.clone();
        let mut recorder = factory
            .create(
                Arc::new(NoFrames),
                Arc::new(move |data: ClipData| sink.lock().push(data)),
            )
            .unwrap();

        // A freshly written script can briefly be busy while another test forks
        let mut started = recorder.start();
        for _ in 0..5 {
            if started.is_ok() {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
            started = recorder.start();
        }
        started.unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while recorder.is_recording() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }

        assert!(!recorder.is_recording());
        assert!(matches!(recorder.stop(), Err(RecordingError::NotRecording)));
        assert!(clips.lock().is_empty());
        assert_eq!(factory.pending.lock().len(), 1);

        // A second session hands off its encoder and prunes the finished one
        recorder.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while recorder.is_recording() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        std::thread::sleep(Duration::from_millis(50));
        let _ = recorder.stop();
        assert_eq!(factory.pending.lock().len(), 1);
        assert_eq!(factory.pending(), 0);
    }
}
