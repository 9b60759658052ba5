//! Object detection interface
//!
//! The controller only cares whether a prediction of the target class is present;
//! scores and any extra fields are carried through for logging.

pub mod command;

pub use command::CommandDetector;

use crate::capture::Frame;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by a detector
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed detector output: {0}")]
    Protocol(String),

    #[error("Detector process exited")]
    Exited,

    #[error("Detection timed out after {0}ms")]
    Timeout(u64),

    #[error("Detector unavailable: {0}")]
    Unavailable(String),
}

/// One classifier output for a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Class label, e.g. `person`
    pub class: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,

    /// Anything else the model reports (boxes etc.)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Prediction {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            score: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Presence check: true iff any prediction has the given class.
pub fn contains_class(predictions: &[Prediction], class: &str) -> bool {
    predictions.iter().any(|p| p.class == class)
}

#[async_trait]
pub trait Detector: Send + Sync {
    /// Run detection on one frame
    async fn detect(&self, frame: &Frame) -> Result<Vec<Prediction>, DetectorError>;
}
