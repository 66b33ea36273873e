//! Error types for the ParkRanger core library

use std::io;
use std::net::AddrParseError;
use thiserror::Error;

/// Result type alias for ParkRanger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error types for the sensing and inference pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// Packet capture errors (interface open, BPF compile, read)
    #[error("Capture error: {0}")]
    Capture(String),

    /// I/O errors with automatic conversion
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Parsing errors for IP addresses, ping output, etc.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Permission/capability errors (raw capture requires elevated privileges)
    #[error("Insufficient privileges: {0}")]
    Privilege(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage/persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Geolocation provider errors
    #[error("Geolocation error: {0}")]
    Geolocation(String),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<AddrParseError> for Error {
    fn from(err: AddrParseError) -> Self {
        Error::Parse(format!("Invalid IP address: {}", err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(format!("TOML parse error: {}", err))
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(format!("TOML serialization error: {}", err))
    }
}
