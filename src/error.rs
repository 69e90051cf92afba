use std::time::Duration;
use thiserror::Error as ThisError;

/// Failures raised by the persistent store layer.
#[derive(ThisError, Debug)]
pub enum StoreError {
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("store path is not an object: {0}")]
    NotAnObject(String),

    #[error("stored record at {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("store backend unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(ThisError, Debug)]
pub enum SyncError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Delivery to subscriber {subscriber} failed: {reason}")]
    DeliveryFailure { subscriber: String, reason: String },

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

impl SyncError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        SyncError::InvalidInput(reason.into())
    }

    /// Whether the error was caused by the caller rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, SyncError::InvalidInput(_))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
