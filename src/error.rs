//! # Error Types
//!
//! Custom error types for Greybike using `thiserror`.

use thiserror::Error;

/// Main error type for Greybike
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Log file header or structure is not a Greybike log
    #[error("Malformed log file: {0}")]
    MalformedLog(String),

    /// Requested log name is not a plain file name in the log directory
    #[error("Invalid log file name: {0:?}")]
    InvalidLogName(String),

    /// Sensor data could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// Broadcast hub subscriber limit reached
    #[error("Too many subscribers (limit {0})")]
    TooManySubscribers(usize),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Greybike
pub type Result<T> = std::result::Result<T, TelemetryError>;
