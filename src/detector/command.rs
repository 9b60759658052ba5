//! Detector backed by a long-lived inference process
//!
//! Line protocol on the child's stdio:
//! - request: one JSON header line `{"width":W,"height":H,"len":N,"sequence":S}` followed by
//!   `N` bytes of RGBA pixels
//! - response: one JSON line holding an array of predictions
//!
//! An exchange that fails or is cancelled drops the process; the next call
//! launches a fresh one so the stream can never be left half-read.

use super::{Detector, DetectorError, Prediction};
use crate::capture::Frame;
use crate::config::DetectorConfig;
use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

#[derive(Debug, Serialize)]
struct FrameHeader {
    width: u32,
    height: u32,
    len: usize,
    sequence: u64,
}

struct DetectorProcess {
    // Held so the child is killed when the process handle is dropped
    _child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl DetectorProcess {
    async fn exchange(&mut self, frame: &Frame) -> Result<Vec<Prediction>, DetectorError> {
        let header = FrameHeader {
            width: frame.width(),
            height: frame.height(),
            len: frame.data.len(),
            sequence: frame.sequence,
        };
        let mut line = serde_json::to_vec(&header)
            .map_err(|e| DetectorError::Protocol(e.to_string()))?;
        line.push(b'\n');

        self.stdin.write_all(&line).await?;
        self.stdin.write_all(&frame.data).await?;
        self.stdin.flush().await?;

        let mut response = String::new();
        let read = self.stdout.read_line(&mut response).await?;
        if read == 0 {
            return Err(DetectorError::Exited);
        }

        parse_predictions(&response)
    }
}

pub struct CommandDetector {
    config: DetectorConfig,
    process: Mutex<Option<DetectorProcess>>,
}

impl CommandDetector {
    /// Launch the inference process
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: &DetectorConfig) -> Result<Self, DetectorError> {
        let process = launch(config)?;
        Ok(Self {
            config: config.clone(),
            process: Mutex::new(Some(process)),
        })
    }
}

fn launch(config: &DetectorConfig) -> Result<DetectorProcess, DetectorError> {
    tracing::info!("Starting detector: {} {:?}", config.program, config.args);

    let mut child = Command::new(&config.program)
        .args(&config.args)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            DetectorError::Unavailable(format!("Failed to start {}: {}", config.program, e))
        })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| DetectorError::Unavailable("Failed to capture detector stdin".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| DetectorError::Unavailable("Failed to capture detector stdout".to_string()))?;

    Ok(DetectorProcess {
        _child: child,
        stdin,
        stdout: BufReader::new(stdout),
    })
}

/// Parse one response line into predictions
pub(crate) fn parse_predictions(line: &str) -> Result<Vec<Prediction>, DetectorError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(DetectorError::Protocol("empty response".to_string()));
    }
    serde_json::from_str(trimmed).map_err(|e| DetectorError::Protocol(format!("{}: {}", e, trimmed)))
}

#[async_trait]
impl Detector for CommandDetector {
    async fn detect(&self, frame: &Frame) -> Result<Vec<Prediction>, DetectorError> {
        let mut slot = self.process.lock().await;

        // Owned for the duration of the exchange: a cancelled or failed call drops it
        let mut process = match slot.take() {
            Some(process) => process,
            None => {
                tracing::warn!("Detector process gone, relaunching {}", self.config.program);
                launch(&self.config)?
            }
        };

        let predictions = process.exchange(frame).await?;
        *slot = Some(process);

        Ok(predictions)
    }
}
