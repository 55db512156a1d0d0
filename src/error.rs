//! Error types for the progress and entitlement engine.

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Backing store rejected a read or write
    #[error("Storage error: {0}")]
    Storage(String),

    /// Local store ran out of room
    #[error("Storage quota exceeded writing {key} ({needed} bytes, {available} available)")]
    QuotaExceeded {
        key: String,
        needed: usize,
        available: usize,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Item rejected before it reached the cart or owned ledger
    #[error("Invalid item: {0}")]
    InvalidItem(String),

    /// Level ids are positive integers
    #[error("Invalid level id: {0}")]
    InvalidLevel(String),

    /// A background task was cancelled before it ran
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}
