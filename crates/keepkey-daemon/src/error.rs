//! Error types for the KeepKey daemon

use keepkey_core::RequestId;
use thiserror::Error;

/// Result type alias for daemon operations
pub type Result<T> = std::result::Result<T, DaemonError>;

/// Errors that can occur in the daemon
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] keepkey_core::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// No device attached
    #[error("Device not connected!")]
    NoDeviceConnected,

    /// Device transport failure
    #[error("Device error: {0}")]
    Device(String),

    /// No pending request with this id
    #[error("No pending request: {0}")]
    UnknownRequest(RequestId),

    /// Pioneer API not configured
    #[error("Pioneer API not configured")]
    PioneerUnavailable,

    /// Pioneer API call failed
    #[error("Pioneer error: {0}")]
    Pioneer(String),

    /// IPC error
    #[error("IPC error: {0}")]
    Ipc(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Origin store error
    #[error("Store error: {0}")]
    Store(String),

    /// Bridge server lifecycle error
    #[error("Bridge error: {0}")]
    Bridge(String),

    /// Udev error
    #[error("Udev error: {0}")]
    Udev(String),

    /// Approval timeout
    #[error("Timed out waiting for user approval")]
    Timeout,

    /// Waiter went away before a decision
    #[error("Request cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for DaemonError {
    fn from(e: serde_json::Error) -> Self {
        DaemonError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for DaemonError {
    fn from(e: reqwest::Error) -> Self {
        DaemonError::Pioneer(e.to_string())
    }
}
