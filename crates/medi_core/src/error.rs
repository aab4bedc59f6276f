//! Error types for the orchestration core.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur during core operations.
///
/// Backend failures are normally folded into outcome values by the
/// orchestrators; an `Err` reaching the caller means the operation was
/// invoked from the wrong state or local I/O failed.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid state for {operation}: current={current}, expected={expected}")]
    InvalidState {
        current: String,
        expected: String,
        operation: String,
    },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Geolocation error: {0}")]
    Geolocation(#[from] GeoError),

    #[error("Speech recognition error: {0}")]
    Speech(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CoreError {
    pub(crate) fn invalid_state(
        operation: impl Into<String>,
        current: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            current: current.into(),
            expected: expected.into(),
            operation: operation.into(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for CoreError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Failures reported by the device position capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeoError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("position unavailable")]
    PositionUnavailable,

    #[error("timed out waiting for a position fix")]
    Timeout,
}
