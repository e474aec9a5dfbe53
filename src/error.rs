//! # Error Types Module
//!
//! Centralized error handling for the acquisition core.
//! Provides custom error types for each module with proper context and error chaining.
//!
//! ## Error Types
//! - `LinkError`: serial link could not be opened or was lost mid-session
//! - `RecorderError`: CSV recording I/O failures and recording backlog
//! - `UploadError`: cloud emotion upload rejections, transport failures and bad responses
//! - `ConfigError`: configuration file I/O, parsing and validation errors
//!
//! Frame corruption is not listed here: the decoder recovers from it locally and
//! only exposes aggregate counts (see `frame::DecoderStats`).

use std::fmt;

/// Errors surfaced by the serial link manager
#[derive(Debug, Clone, PartialEq)]
pub enum LinkError {
    /// The port could not be opened or configured
    Unavailable { port: String, reason: String },
    /// The link failed while a session was running
    Lost { session: u64, reason: String },
    /// Failed to start the read thread
    ThreadSpawn(String),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Unavailable { port, reason } => {
                write!(f, "Serial link {} unavailable: {}", port, reason)
            }
            LinkError::Lost { session, reason } => {
                write!(f, "Serial link lost during session {}: {}", session, reason)
            }
            LinkError::ThreadSpawn(msg) => {
                write!(f, "Failed to start serial read thread: {}", msg)
            }
        }
    }
}

impl std::error::Error for LinkError {}

/// Errors that can occur while recording to CSV
#[derive(Debug)]
pub enum RecorderError {
    /// Opening, writing or flushing the destination failed
    Io(std::io::Error),
    /// The CSV writer or reader rejected a record
    Csv(csv::Error),
    /// JSON export failed to serialize
    Json(serde_json::Error),
    /// A row in a recording could not be interpreted
    InvalidRow { line: u64, reason: String },
    /// `start` was called while a recording is in progress
    AlreadyRecording,
    /// `stop` was called with no recording in progress
    NotRecording,
    /// The writer thread panicked
    WriterPanicked,
    /// Samples could not be queued for the writer, so the recording is incomplete
    Backlog { rows_written: u64, missed: u64 },
}

impl fmt::Display for RecorderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecorderError::Io(e) => write!(f, "Recording I/O failed: {}", e),
            RecorderError::Csv(e) => write!(f, "CSV error: {}", e),
            RecorderError::Json(e) => write!(f, "JSON export error: {}", e),
            RecorderError::InvalidRow { line, reason } => {
                write!(f, "Invalid recording row at line {}: {}", line, reason)
            }
            RecorderError::AlreadyRecording => write!(f, "Recording already in progress"),
            RecorderError::NotRecording => write!(f, "No recording in progress"),
            RecorderError::WriterPanicked => write!(f, "Recording writer thread panicked"),
            RecorderError::Backlog { rows_written, missed } => write!(
                f,
                "Recording backlog: {} samples could not be queued ({} rows written)",
                missed, rows_written
            ),
        }
    }
}

impl std::error::Error for RecorderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RecorderError::Io(e) => Some(e),
            RecorderError::Csv(e) => Some(e),
            RecorderError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RecorderError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<csv::Error> for RecorderError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

impl From<serde_json::Error> for RecorderError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Errors from a single cloud upload attempt
#[derive(Debug, Clone, PartialEq)]
pub enum UploadError {
    /// Not enough buffered samples for the requested window
    InsufficientData { available: usize, required: usize },
    /// The request body failed validation before sending
    RequestMalformed(String),
    /// Transport failure or non-success HTTP status
    UploadFailed(String),
    /// No response within the configured timeout
    UploadTimeout,
    /// The server answered, but not with a usable emotion result
    ResponseMalformed(String),
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::InsufficientData { available, required } => write!(
                f,
                "Insufficient data for upload: {} samples buffered, {} required",
                available, required
            ),
            UploadError::RequestMalformed(msg) => write!(f, "Malformed upload request: {}", msg),
            UploadError::UploadFailed(msg) => write!(f, "Upload failed: {}", msg),
            UploadError::UploadTimeout => write!(f, "Upload timed out"),
            UploadError::ResponseMalformed(msg) => {
                write!(f, "Malformed emotion response: {}", msg)
            }
        }
    }
}

impl std::error::Error for UploadError {}

/// Errors that can occur during configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read config file
    ReadFailed(std::io::Error),
    /// Failed to write config file
    WriteFailed(std::io::Error),
    /// Failed to parse config file
    ParseFailed(toml::de::Error),
    /// Failed to serialize config
    SerializeFailed(toml::ser::Error),
    /// A value is out of range
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReadFailed(e) => {
                write!(f, "Failed to read config file: {}", e)
            }
            ConfigError::WriteFailed(e) => {
                write!(f, "Failed to write config file: {}", e)
            }
            ConfigError::ParseFailed(e) => {
                write!(f, "Failed to parse config file: {}", e)
            }
            ConfigError::SerializeFailed(e) => {
                write!(f, "Failed to serialize config: {}", e)
            }
            ConfigError::Invalid(msg) => {
                write!(f, "Invalid configuration: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadFailed(e) => Some(e),
            ConfigError::WriteFailed(e) => Some(e),
            ConfigError::ParseFailed(e) => Some(e),
            ConfigError::SerializeFailed(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_error_display() {
        let err = LinkError::Unavailable {
            port: "/dev/ttyUSB0".to_string(),
            reason: "No such file or directory".to_string(),
        };
        assert!(err.to_string().contains("/dev/ttyUSB0"));
    }

    #[test]
    fn test_config_error_chain() {
        use std::error::Error;
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = ConfigError::ReadFailed(io_err);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_recorder_error_from_io() {
        use std::error::Error;
        let err: RecorderError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, RecorderError::Io(_)));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_insufficient_data_display() {
        let err = UploadError::InsufficientData {
            available: 100,
            required: 2500,
        };
        let msg = err.to_string();
        assert!(msg.contains("100"));
        assert!(msg.contains("2500"));
    }
}
