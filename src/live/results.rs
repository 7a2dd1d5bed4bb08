//! Deliverable results
//!
//! What a consumer receives: a result view already imported into the
//! consumer's session, together with the sort order it was produced under.

use std::slice;

use crate::mvcc::VersionId;
use crate::store::{Row, SessionId, SortOrder, TableView};

/// Rows of an async query, bound to the consumer's session
#[derive(Debug, Clone)]
pub struct Results {
    view: TableView,
    sort: SortOrder,
}

impl Results {
    pub(crate) fn new(view: TableView, sort: SortOrder) -> Self {
        Self { view, sort }
    }

    /// Snapshot version the rows were computed at
    pub fn version(&self) -> VersionId {
        self.view.version()
    }

    /// Session the rows are bound to
    pub fn session_id(&self) -> Option<SessionId> {
        self.view.session_id()
    }

    pub fn sort_order(&self) -> &SortOrder {
        &self.sort
    }

    pub fn len(&self) -> usize {
        self.view.len()
    }

    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Row> {
        self.view.rows().get(index)
    }

    pub fn iter(&self) -> slice::Iter<'_, Row> {
        self.view.rows().iter()
    }

    /// Document keys in result order
    pub fn keys(&self) -> Vec<&str> {
        self.iter().map(Row::key).collect()
    }

    /// The underlying view, for further syncing on the consumer session
    pub fn into_view(self) -> TableView {
        self.view
    }
}

impl<'a> IntoIterator for &'a Results {
    type Item = &'a Row;
    type IntoIter = slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
