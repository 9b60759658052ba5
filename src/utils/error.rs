//! Error types and handling
//!
//! Application-wide error aggregating the subsystem errors.

use crate::capture::CaptureError;
use crate::config::ConfigError;
use crate::detector::DetectorError;
use crate::recorder::RecordingError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Detector error: {0}")]
    Detector(#[from] DetectorError),

    #[error("Recording error: {0}")]
    Recording(#[from] RecordingError),

    #[error("Not ready: {0}")]
    NotReady(String),
}

/// Error response for frontend
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Capture(_) => "CAPTURE_ERROR",
            AppError::Detector(_) => "DETECTOR_ERROR",
            AppError::Recording(_) => "RECORDING_ERROR",
            AppError::NotReady(_) => "NOT_READY",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_codes() {
        let response = ErrorResponse::from(AppError::from(CaptureError::NoFrame));
        assert_eq!(response.code, "CAPTURE_ERROR");
        assert!(response.message.contains("No frame"));

        let response = ErrorResponse::from(AppError::NotReady("no source".to_string()));
        assert_eq!(response.code, "NOT_READY");
    }
}
