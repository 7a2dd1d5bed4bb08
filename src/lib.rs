//! aerolive - cross-thread asynchronous query handover
//!
//! Queries are evaluated on background worker sessions against MVCC
//! snapshots of a shared store. Their result sets are handed to consumer
//! sessions on other threads, with stale results discarded and evaluation
//! errors reported exactly once.

pub mod live;
pub mod mvcc;
pub mod observability;
pub mod store;
