//! Relay directory error types

use std::io;
use thiserror::Error;

/// Result type for relay directory operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors that can occur while reading or writing the relay directory
#[derive(Debug, Error)]
pub enum RelayError {
    /// Cache file is unreadable or unwritable
    #[error("Relay cache IO error: {0}")]
    Io(#[from] io::Error),

    /// Cache file contents are not a valid relay directory document
    #[error("Relay cache decoding error: {0}")]
    Codec(#[from] serde_json::Error),
}
