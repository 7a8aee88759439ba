//! # Error Types
//!
//! Custom error types for the drone dashboard using `thiserror`.

use thiserror::Error;

/// Main error type for the drone dashboard
#[derive(Debug, Error)]
pub enum DashboardError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Telemetry payload could not be decoded
    #[error("Malformed telemetry payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// Socket open/send/close failures
    #[error("Transport error: {0}")]
    Transport(String),

    /// Outbound command issued without an open socket
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// The connection manager task is no longer running
    #[error("Connection manager stopped")]
    ManagerStopped,
}

/// Result type alias for the drone dashboard
pub type Result<T> = std::result::Result<T, DashboardError>;
