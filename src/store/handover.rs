//! Handover envelopes
//!
//! A `Handover<T>` packages a live, session-bound value so another session,
//! usually on another thread, can rehydrate it. Each envelope is tagged with:
//! - the store it came from
//! - the VersionId of the exporting session at export time
//! - whether the source stayed live (`Copy`) or was consumed (`Move`)
//!
//! Importing takes the envelope by value, so a given envelope can be
//! consumed once. Copy-mode envelopes may be cloned with `try_clone` when
//! more than one session needs the same payload; move-mode envelopes are the
//! only copy of their value and cannot be.

use std::fmt;

use super::errors::StorageResult;
use super::session::Session;
use super::StoreId;
use crate::mvcc::VersionId;

/// How the source object was treated on export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadMode {
    /// Source remains live on the exporting session
    Copy,
    /// Source was consumed; the envelope is now the only copy
    Move,
}

/// A live value that can cross sessions through a `Handover`.
pub trait Exportable: Sized {
    /// Session-independent state carried by the envelope
    type Payload: Clone + fmt::Debug + Send;

    /// Snapshot the state, leaving `self` live.
    fn to_payload(&self) -> Self::Payload;

    /// Give up `self`, keeping its evaluation state.
    fn into_payload(self) -> Self::Payload;

    /// Reject payloads `session` cannot rehydrate.
    ///
    /// `version` is the tag the envelope was exported with.
    fn check_import(
        _payload: &Self::Payload,
        _version: VersionId,
        _session: &Session,
    ) -> StorageResult<()> {
        Ok(())
    }

    /// Rebuild a live value bound to `session`. Only called after
    /// `check_import` accepted the payload.
    fn from_handover(payload: Self::Payload, version: VersionId, session: &Session) -> Self;
}

/// A value of type `T` in transit between sessions.
pub struct Handover<T: Exportable> {
    store: StoreId,
    version: VersionId,
    mode: PayloadMode,
    payload: T::Payload,
}

impl<T: Exportable> Handover<T> {
    pub(crate) fn new(store: StoreId, version: VersionId, mode: PayloadMode, payload: T::Payload) -> Self {
        Self {
            store,
            version,
            mode,
            payload,
        }
    }

    /// Version of the exporting session at export time
    pub fn version(&self) -> VersionId {
        self.version
    }

    pub fn store_id(&self) -> StoreId {
        self.store
    }

    pub fn mode(&self) -> PayloadMode {
        self.mode
    }

    /// Duplicate a copy-mode envelope; `None` for move-mode ones.
    pub fn try_clone(&self) -> Option<Self> {
        match self.mode {
            PayloadMode::Copy => Some(Self {
                store: self.store,
                version: self.version,
                mode: self.mode,
                payload: self.payload.clone(),
            }),
            PayloadMode::Move => None,
        }
    }

    pub(crate) fn payload(&self) -> &T::Payload {
        &self.payload
    }

    pub(crate) fn into_parts(self) -> (StoreId, VersionId, T::Payload) {
        (self.store, self.version, self.payload)
    }
}

impl<T: Exportable> fmt::Debug for Handover<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handover")
            .field("store", &self.store)
            .field("version", &self.version)
            .field("mode", &self.mode)
            .field("payload", &self.payload)
            .finish()
    }
}
