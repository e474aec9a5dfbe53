//! # Configuration Management Module
//!
//! Persistent acquisition settings stored in platform-appropriate locations.
//! Handles loading, saving, validating and providing defaults.
//!
//! ## Sections
//! - `serial`: port, baud rate, read timeout
//! - `acquisition`: sample rate, store capacity, frame checksum
//! - `distribution`: consumer queue sizes, live window length
//! - `recording`: output directory
//! - `cloud`: emotion server endpoint, timeouts, upload window and interval
//!
//! ## Storage Location
//! - macOS: ~/Library/Application Support/physio-acq/config.toml
//! - Linux: ~/.config/physio-acq/config.toml
//! - Windows: %APPDATA%\physio-acq\config.toml
//!
//! Every field has a default, so a partial file (or none at all) is valid.

use crate::error::ConfigError;
use crate::frame::ChecksumKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`
    pub port: Option<String>,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 3_000_000,
            read_timeout_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub sample_rate: u32,
    /// Seconds of history held by the sample store
    pub capacity_seconds: f64,
    pub checksum: ChecksumKind,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 500,
            capacity_seconds: 10.0,
            checksum: ChecksumKind::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    pub live_queue_capacity: usize,
    pub recorder_queue_capacity: usize,
    pub live_window_seconds: f64,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            live_queue_capacity: 1_000,
            recorder_queue_capacity: 10_000,
            live_window_seconds: 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub output_dir: PathBuf,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    pub server_url: String,
    pub timeout_secs: u64,
    /// Trailing window sent with each upload
    pub window_seconds: f64,
    /// Minimum buffered duration before an upload is attempted
    pub min_seconds: f64,
    pub upload_interval_ms: u64,
    pub api_key: Option<String>,
    pub verify_ssl: bool,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000/api/emotion".to_string(),
            timeout_secs: 30,
            window_seconds: 5.0,
            min_seconds: 5.0,
            upload_interval_ms: 2_000,
            api_key: None,
            verify_ssl: true,
        }
    }
}

impl CloudConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn upload_interval(&self) -> Duration {
        Duration::from_millis(self.upload_interval_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub acquisition: AcquisitionConfig,
    pub distribution: DistributionConfig,
    pub recording: RecordingConfig,
    pub cloud: CloudConfig,
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("physio-acq")
            .join("config.toml")
    }

    /// Load config from the default location, or create it with defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::config_path())
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::config_path())
    }

    /// Load config from `path`, writing defaults there if it doesn't exist
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(contents) => {
                let config: Config = toml::from_str(&contents).map_err(ConfigError::ParseFailed)?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config at {}, writing defaults", path.display());
                let config = Self::default();
                config.save_to(path)?;
                Ok(config)
            }
            Err(e) => Err(ConfigError::ReadFailed(e)),
        }
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::WriteFailed)?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)?;
        fs::write(path, toml_string).map_err(ConfigError::WriteFailed)?;

        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.serial.baud_rate == 0 {
            return invalid("serial.baud_rate must be positive");
        }
        if self.acquisition.sample_rate == 0 {
            return invalid("acquisition.sample_rate must be positive");
        }
        if !positive(self.acquisition.capacity_seconds) {
            return invalid("acquisition.capacity_seconds must be positive");
        }
        if self.distribution.live_queue_capacity == 0 || self.distribution.recorder_queue_capacity == 0 {
            return invalid("distribution queue capacities must be positive");
        }
        if !positive(self.distribution.live_window_seconds) {
            return invalid("distribution.live_window_seconds must be positive");
        }
        if !positive(self.cloud.window_seconds) || !non_negative(self.cloud.min_seconds) {
            return invalid("cloud.window_seconds must be positive and cloud.min_seconds non-negative");
        }
        if self.cloud.min_seconds > self.cloud.window_seconds {
            return invalid("cloud.min_seconds cannot exceed cloud.window_seconds");
        }
        if self.acquisition.capacity_seconds < self.cloud.window_seconds {
            return Err(ConfigError::Invalid(format!(
                "acquisition.capacity_seconds ({}) must cover cloud.window_seconds ({})",
                self.acquisition.capacity_seconds, self.cloud.window_seconds
            )));
        }
        if self.cloud.upload_interval_ms == 0 || self.cloud.timeout_secs == 0 {
            return invalid("cloud.upload_interval_ms and cloud.timeout_secs must be positive");
        }
        Ok(())
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.serial.baud_rate, 3_000_000);
        assert_eq!(config.acquisition.sample_rate, 500);
        assert_eq!(config.acquisition.checksum, ChecksumKind::None);
        assert_eq!(config.cloud.server_url, "http://127.0.0.1:5000/api/emotion");
        assert_eq!(config.cloud.timeout(), Duration::from_secs(30));
        assert_eq!(config.cloud.upload_interval(), Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.acquisition.checksum = ChecksumKind::Sum8;
        config.serial.port = Some("/dev/ttyUSB0".to_string());

        let toml_str = toml::to_string(&config).expect("Failed to serialize");
        assert!(toml_str.contains("checksum = \"sum8\""));
        assert!(toml_str.contains("port = \"/dev/ttyUSB0\""));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml_str = r#"
            [serial]
            port = "COM3"

            [cloud]
            verify_ssl = false
        "#;

        let config: Config = toml::from_str(toml_str).expect("Failed to deserialize");
        assert_eq!(config.serial.port.as_deref(), Some("COM3"));
        assert_eq!(config.serial.baud_rate, 3_000_000);
        assert!(!config.cloud.verify_ssl);
        assert_eq!(config.cloud.timeout_secs, 30);
    }

    #[test]
    fn test_load_creates_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).expect("Failed to load config");
        assert_eq!(config, Config::default());
        assert!(path.exists());

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.recording.output_dir = PathBuf::from("/tmp/recordings");
        config.cloud.api_key = Some("secret".to_string());
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.recording.output_dir, PathBuf::from("/tmp/recordings"));
        assert_eq!(loaded.cloud.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.acquisition.capacity_seconds = 2.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.acquisition.sample_rate = 0;
        assert!(config.validate().is_err());

        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[acquisition]\nsample_rate = 0\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Invalid(_))));

        fs::write(&path, "not = [valid").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::ParseFailed(_))));
    }

    #[test]
    fn test_non_finite_durations_rejected() {
        let mut config = Config::default();
        config.acquisition.capacity_seconds = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.acquisition.capacity_seconds = f64::INFINITY;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.distribution.live_window_seconds = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.cloud.window_seconds = f64::INFINITY;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.cloud.min_seconds = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.cloud.min_seconds = 0.0;
        assert!(config.validate().is_ok());
    }
}
