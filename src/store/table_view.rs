//! Table views: materialized query results
//!
//! A view starts detached, becomes attached on its first evaluation and is
//! then refreshed in place with `sync_if_needed` as its session advances.
//! When the layout epoch at the session's snapshot moves, the view is
//! recomputed from scratch instead of being compared against its previous
//! rows.

use super::errors::{StorageError, StorageResult};
use super::handover::Exportable;
use super::query::QueryPayload;
use super::session::{Session, SessionId};
use super::sort::{ResultSorter, SortOrder};
use super::store::Row;
use crate::mvcc::VersionId;

/// The materialized, optionally sorted row set of a query.
#[derive(Debug, Clone)]
pub struct TableView {
    session: Option<SessionId>,
    query: Option<QueryPayload>,
    rows: Vec<Row>,
    version: VersionId,
    layout_epoch: u64,
    sort: SortOrder,
}

/// Session-independent state of a view in transit
#[derive(Debug, Clone)]
pub struct TableViewPayload {
    query: Option<QueryPayload>,
    rows: Vec<Row>,
    version: VersionId,
    layout_epoch: u64,
    sort: SortOrder,
}

impl Default for TableView {
    fn default() -> Self {
        Self::detached()
    }
}

impl TableView {
    /// An empty view that has never been evaluated
    pub fn detached() -> Self {
        Self {
            session: None,
            query: None,
            rows: Vec::new(),
            version: VersionId::INITIAL,
            layout_epoch: 0,
            sort: SortOrder::none(),
        }
    }

    pub(crate) fn evaluate(query: QueryPayload, session: &Session) -> StorageResult<Self> {
        let layout_epoch = session.store().layout_epoch_at(session.current_version());
        let rows = query.evaluate(session)?;
        Ok(Self {
            session: Some(session.id()),
            query: Some(query),
            rows,
            version: session.current_version(),
            layout_epoch,
            sort: SortOrder::none(),
        })
    }

    pub fn is_attached(&self) -> bool {
        self.session.is_some()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session
    }

    /// Snapshot version the rows were computed at
    pub fn version(&self) -> VersionId {
        self.version
    }

    pub fn layout_epoch(&self) -> u64 {
        self.layout_epoch
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn sort_order(&self) -> &SortOrder {
        &self.sort
    }

    /// Sort the rows and keep `order` for later refreshes
    pub fn sort(&mut self, order: &SortOrder) {
        self.sort = order.clone();
        ResultSorter::sort(&mut self.rows, &self.sort);
    }

    /// Bring the view up to the session's current snapshot.
    ///
    /// Returns whether the row set changed.
    pub fn sync_if_needed(&mut self, session: &Session) -> StorageResult<bool> {
        let bound = self.session.ok_or(StorageError::ViewDetached)?;
        if bound != session.id() {
            return Err(StorageError::SessionMismatch {
                bound,
                used: session.id(),
            });
        }
        let query = self.query.as_ref().ok_or(StorageError::ViewDetached)?;

        let version = session.current_version();
        let layout_epoch = session.store().layout_epoch_at(version);

        if layout_epoch == self.layout_epoch && version == self.version {
            return Ok(false);
        }

        let mut rows = query.evaluate(session)?;
        ResultSorter::sort(&mut rows, &self.sort);

        let changed = layout_epoch != self.layout_epoch || !Self::same_rows(&rows, &self.rows);
        self.rows = rows;
        self.version = version;
        self.layout_epoch = layout_epoch;
        Ok(changed)
    }

    fn same_rows(a: &[Row], b: &[Row]) -> bool {
        a.len() == b.len()
            && a
                .iter()
                .zip(b)
                .all(|(x, y)| x.key == y.key && x.commit == y.commit)
    }
}

impl Exportable for TableView {
    type Payload = TableViewPayload;

    fn to_payload(&self) -> TableViewPayload {
        TableViewPayload {
            query: self.query.clone(),
            rows: self.rows.clone(),
            version: self.version,
            layout_epoch: self.layout_epoch,
            sort: self.sort.clone(),
        }
    }

    fn into_payload(self) -> TableViewPayload {
        TableViewPayload {
            query: self.query,
            rows: self.rows,
            version: self.version,
            layout_epoch: self.layout_epoch,
            sort: self.sort,
        }
    }

    /// Result sets are only meaningful at or after the importing snapshot.
    fn check_import(
        payload: &TableViewPayload,
        version: VersionId,
        session: &Session,
    ) -> StorageResult<()> {
        if version < session.current_version() {
            return Err(StorageError::StaleHandover {
                handover: version,
                session: session.current_version(),
            });
        }
        if payload.query.is_none() {
            return Err(StorageError::ViewDetached);
        }
        Ok(())
    }

    fn from_handover(payload: TableViewPayload, _version: VersionId, session: &Session) -> Self {
        Self {
            session: Some(session.id()),
            query: payload.query,
            rows: payload.rows,
            version: payload.version,
            layout_epoch: payload.layout_epoch,
            sort: payload.sort,
        }
    }
}
