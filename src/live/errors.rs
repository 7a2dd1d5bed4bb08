//! # Live Query Errors
//!
//! Error types for registering and running async queries.

use thiserror::Error;

use crate::store::StorageError;

/// Result type for live query operations
pub type LiveResult<T> = Result<T, LiveError>;

/// Live query errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiveError {
    /// Store-level failure during export, import or evaluation
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Registry is full
    #[error("Too many async queries (max: {0})")]
    TooManyQueries(usize),

    /// Configuration error
    #[error("Configuration error: {0}")]
    InvalidConfig(String),
}

impl LiveError {
    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            LiveError::Storage(err) => err.code(),
            LiveError::TooManyQueries(_) => "AERO_LIVE_TOO_MANY_QUERIES",
            LiveError::InvalidConfig(_) => "AERO_LIVE_INVALID_CONFIG",
        }
    }
}
