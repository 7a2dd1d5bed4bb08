//! # Store Errors
//!
//! Error types for the versioned store, sessions and handover import.
//!
//! Every variant maps to a stable `AERO_*` code.

use thiserror::Error;

use super::session::SessionId;
use super::StoreId;
use crate::mvcc::VersionId;

/// Result type for store operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    // ==================
    // Layout Errors
    // ==================
    /// Collection does not exist (or was dropped)
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Collection already exists
    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    // ==================
    // Handover Errors
    // ==================
    /// Envelope was exported from a different store
    #[error("Handover from store {handover} cannot be imported into store {session}")]
    ForeignHandover { handover: StoreId, session: StoreId },

    /// Result envelope is older than the importing session
    #[error("Stale handover: built at {handover} but session is at {session}")]
    StaleHandover {
        handover: VersionId,
        session: VersionId,
    },

    // ==================
    // Session Errors
    // ==================
    /// A live object was used with a session it is not bound to
    #[error("Session mismatch: bound to {bound} but used with {used}")]
    SessionMismatch { bound: SessionId, used: SessionId },

    /// Session cannot move to the requested version
    #[error("Invalid version {requested}: {reason}")]
    InvalidVersion {
        requested: VersionId,
        reason: &'static str,
    },

    /// Operation requires an attached table view
    #[error("Table view is not attached")]
    ViewDetached,

    // ==================
    // Internal Errors
    // ==================
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            StorageError::CollectionNotFound(_) => "AERO_COLLECTION_NOT_FOUND",
            StorageError::CollectionExists(_) => "AERO_COLLECTION_EXISTS",
            StorageError::ForeignHandover { .. } => "AERO_HANDOVER_FOREIGN",
            StorageError::StaleHandover { .. } => "AERO_HANDOVER_STALE",
            StorageError::SessionMismatch { .. } => "AERO_SESSION_MISMATCH",
            StorageError::InvalidVersion { .. } => "AERO_INVALID_VERSION",
            StorageError::ViewDetached => "AERO_VIEW_DETACHED",
            StorageError::Internal(_) => "AERO_STORAGE_INTERNAL",
        }
    }
}
