//! Error types for the optimizer core

use thiserror::Error;

/// Main error type for optimizer operations
#[derive(Debug, Error)]
pub enum UfoError {
    /// The platform rejected a forwarded call
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),
    /// Malformed JSON payload (broadcasts, overrides)
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Rejections raised by the native listener store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// Event type was empty
    #[error("invalid event type {0:?}")]
    InvalidEventType(String),
    /// Target has been disposed and no longer accepts listeners
    #[error("target {0} is disposed")]
    Disposed(u64),
}

/// Convenience Result type for optimizer operations
pub type Result<T> = std::result::Result<T, UfoError>;
