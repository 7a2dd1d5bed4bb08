//! Versioned document store
//!
//! The transactional substrate the handover protocol runs on:
//! - **Store**: shared, versioned collections of JSON documents
//! - **Session**: per-thread snapshot reader, import/export endpoint
//! - **Handover**: envelope carrying a query or result set between sessions
//! - **Query / TableView**: live query and its materialized result set

mod errors;
mod handover;
mod query;
mod session;
mod sort;
#[allow(clippy::module_inception)]
mod store;
mod table_view;

pub use errors::{StorageError, StorageResult};
pub use handover::{Exportable, Handover, PayloadMode};
pub use query::{FilterOp, Predicate, PredicateFilter, Query, QueryPayload};
pub use session::{Rejected, Session, SessionId};
pub use sort::{ResultSorter, SortDirection, SortOrder, SortSpec};
pub use store::{Row, Store, StoreId, Write, WriteBatch};
pub use table_view::{TableView, TableViewPayload};
