//! Storage sessions
//!
//! A session is the per-thread transactional context over a shared store.
//! It reads at one snapshot (its ReadView) until explicitly advanced, and
//! its version only ever moves forward.
//!
//! Sessions are also the import/export endpoints of the handover protocol.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use super::errors::{StorageError, StorageResult};
use super::handover::{Exportable, Handover, PayloadMode};
use super::query::Query;
use super::store::{Store, WriteBatch};
use crate::mvcc::{ReadView, VersionId};

/// Unique identity of a session.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A transactional context reading one snapshot of a store.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    store: Arc<Store>,
    view: ReadView,
}

impl Session {
    /// Open a session at the store's latest version
    pub fn open(store: &Arc<Store>) -> Self {
        Self {
            id: SessionId::generate(),
            store: Arc::clone(store),
            view: store.current_snapshot(),
        }
    }

    /// Open a session pinned at an already committed version
    pub fn open_at(store: &Arc<Store>, version: VersionId) -> StorageResult<Self> {
        if version > store.latest_version() {
            return Err(StorageError::InvalidVersion {
                requested: version,
                reason: "version has not been committed",
            });
        }
        Ok(Self {
            id: SessionId::generate(),
            store: Arc::clone(store),
            view: ReadView::new(version),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Version of the snapshot this session currently reads
    pub fn current_version(&self) -> VersionId {
        self.view.upper_bound()
    }

    pub fn read_view(&self) -> ReadView {
        self.view
    }

    /// Move to the store's latest version
    pub fn advance_read(&mut self) -> VersionId {
        self.view = self.store.current_snapshot();
        self.current_version()
    }

    /// Move to a specific version between the current and the latest one
    pub fn advance_to(&mut self, version: VersionId) -> StorageResult<()> {
        if version < self.current_version() {
            return Err(StorageError::InvalidVersion {
                requested: version,
                reason: "sessions never move backwards",
            });
        }
        if version > self.store.latest_version() {
            return Err(StorageError::InvalidVersion {
                requested: version,
                reason: "version has not been committed",
            });
        }
        self.view = ReadView::new(version);
        Ok(())
    }

    /// Commit a batch and move to the version it produced
    pub fn write(&mut self, batch: WriteBatch) -> StorageResult<VersionId> {
        let version = self.store.commit(batch)?;
        self.view = ReadView::new(version);
        Ok(version)
    }

    /// Start a query over `collection`, bound to this session
    pub fn query(&self, collection: impl Into<String>) -> Query {
        Query::new(self.id, collection)
    }

    /// Package `live` for another session; `live` stays usable here.
    pub fn export_copy<T: Exportable>(&self, live: &T) -> Handover<T> {
        Handover::new(
            self.store.id(),
            self.current_version(),
            PayloadMode::Copy,
            live.to_payload(),
        )
    }

    /// Package `live` for another session, consuming it.
    pub fn export_move<T: Exportable>(&self, live: T) -> Handover<T> {
        Handover::new(
            self.store.id(),
            self.current_version(),
            PayloadMode::Move,
            live.into_payload(),
        )
    }

    /// Rehydrate an envelope into a live value bound to this session.
    pub fn import<T: Exportable>(&self, handover: Handover<T>) -> StorageResult<T> {
        self.try_import(handover).map_err(|rejected| rejected.0)
    }

    /// Like `import`, but a rejected envelope is handed back with the error
    /// so it can be offered to another session.
    pub fn try_import<T: Exportable>(&self, handover: Handover<T>) -> Result<T, Rejected<T>> {
        if let Err(err) = self.check_import(&handover) {
            return Err(Rejected(err, handover));
        }
        let (_, version, payload) = handover.into_parts();
        Ok(T::from_handover(payload, version, self))
    }

    fn check_import<T: Exportable>(&self, handover: &Handover<T>) -> StorageResult<()> {
        if handover.store_id() != self.store.id() {
            return Err(StorageError::ForeignHandover {
                handover: handover.store_id(),
                session: self.store.id(),
            });
        }
        T::check_import(handover.payload(), handover.version(), self)
    }
}

/// An envelope a session refused to import, with the reason
#[derive(Debug)]
pub struct Rejected<T: Exportable>(pub StorageError, pub Handover<T>);
