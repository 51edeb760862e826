//! # Error Types
//!
//! Custom error types for the safety monitor using `thiserror`.

use thiserror::Error;

/// Main error type for the safety monitor
#[derive(Debug, Error)]
pub enum SafetyError {
    /// Invalid or missing threshold values
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Status report serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Vehicle link absent or telemetry fetch failed
    #[error("Telemetry unavailable: {0}")]
    TelemetryUnavailable(String),

    /// The vehicle refused a flight-mode command
    #[error("Vehicle rejected mode {mode}: {reason}")]
    CommandRejected { mode: String, reason: String },

    /// A line in an exported safety log could not be parsed
    #[error("Malformed safety log line {line}: {content}")]
    LogFormat { line: usize, content: String },
}

/// Result type alias for the safety monitor
pub type Result<T> = std::result::Result<T, SafetyError>;
