//! Application configuration
//!
//! JSON config file loading plus validation of the loaded values.

pub mod schema;

pub use schema::{
    AppConfig, ControllerConfig, DetectorConfig, RecorderConfig, SourceBackend, SourceConfig,
};

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "PRESENCE_CAM_CONFIG";

/// Config-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl AppConfig {
    /// Read a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.validate()?;

        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Resolve the config path from an explicit argument, then the environment
    pub fn resolve_path(arg: Option<String>) -> Option<PathBuf> {
        arg.or_else(|| std::env::var(CONFIG_ENV).ok())
            .map(PathBuf::from)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.controller.history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "controller.historyCapacity must be at least 1".to_string(),
            ));
        }
        if self.controller.target_class.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "controller.targetClass must not be empty".to_string(),
            ));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(ConfigError::Invalid(
                "source width and height must be non-zero".to_string(),
            ));
        }
        if self.source.fps == 0 || self.recorder.fps == 0 {
            return Err(ConfigError::Invalid("fps must be non-zero".to_string()));
        }
        if self.source.backend == SourceBackend::Webcam && !cfg!(feature = "webcam") {
            return Err(ConfigError::Invalid(
                "source.backend \"webcam\" needs the `webcam` feature".to_string(),
            ));
        }
        if self.detector.program.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "detector.program must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.json")).unwrap();

        assert_eq!(config.controller.target_class, "person");
        assert_eq!(config.controller.history_capacity, 10);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "controller": { "historyCapacity": 4 }, "recorder": { "outputDir": "/tmp/out" } }"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();

        assert_eq!(config.controller.history_capacity, 4);
        assert_eq!(config.controller.target_class, "person");
        assert_eq!(config.recorder.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.recorder.fps, 30);
    }

    #[test]
    fn test_serialized_defaults_load_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.detector.program = "python3".to_string();
        config.detector.args = vec!["detect.py".to_string()];
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.detector.program, "python3");
        assert_eq!(loaded.detector.args, vec!["detect.py".to_string()]);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "controller": { "historyCapacity": 0 } }"#).unwrap();

        assert!(matches!(
            AppConfig::load(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_malformed_json_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(AppConfig::load(&path), Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_backend_parsing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "source": { "backend": "webcam", "input": "1" } }"#).unwrap();

        let result = AppConfig::load(&path);
        if cfg!(feature = "webcam") {
            let config = result.unwrap();
            assert_eq!(config.source.backend, SourceBackend::Webcam);
            assert_eq!(config.source.input, "1");
        } else {
            assert!(matches!(result, Err(ConfigError::Invalid(_))));
        }

        assert_eq!(AppConfig::default().source.backend, SourceBackend::Ffmpeg);
    }
}
