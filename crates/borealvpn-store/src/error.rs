//! Configuration store error types

use std::io;
use thiserror::Error;

/// Result type for configuration store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while accessing the secure configuration store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The secure-store backend reported a failure
    #[error("Secure store access failure: {0}")]
    Access(String),

    /// A stored value could not be encoded or decoded
    #[error("Stored configuration encoding error: {0}")]
    Codec(#[from] serde_json::Error),

    /// No entry exists for the requested account or reference
    #[error("No stored configuration for this account")]
    NotFound,

    /// The shared settings file could not be read or written
    #[error("Application settings IO error: {0}")]
    SettingsIo(#[from] io::Error),

    /// The background task queue has shut down
    #[error("Configuration task queue terminated")]
    QueueGone,
}

impl From<keyring::Error> for StoreError {
    fn from(error: keyring::Error) -> Self {
        match error {
            keyring::Error::NoEntry => StoreError::NotFound,
            other => StoreError::Access(other.to_string()),
        }
    }
}
