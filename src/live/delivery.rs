//! # Deferred Deliveries
//!
//! `get_results` never calls the callback directly. It queues a `Delivery`
//! that the consumer runs later, outside every evaluator lock, on its own
//! thread. Each delivery holds its query alive until it has run.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use super::async_query::{AsyncQuery, QueryId};
use super::captured::CapturedError;
use super::results::Results;
use crate::mvcc::VersionId;
use crate::store::Session;

/// One queued unit of consumer work
pub enum Delivery {
    /// Fresh results, delivered only if the consumer is still at
    /// `expected_version`
    Results {
        query: Arc<AsyncQuery>,
        results: Results,
        expected_version: VersionId,
    },
    /// Terminal error, reported once per query
    Error {
        query: Arc<AsyncQuery>,
        error: CapturedError,
    },
}

/// What running a delivery did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Callback received results
    Delivered,
    /// Consumer moved on; nothing delivered
    Skipped,
    /// Callback received the error and unregistration was requested
    ErrorReported,
    /// Error was already reported by an earlier delivery
    AlreadyReported,
}

impl Delivery {
    pub fn query_id(&self) -> QueryId {
        match self {
            Delivery::Results { query, .. } | Delivery::Error { query, .. } => query.id(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Delivery::Error { .. })
    }

    /// Run on the consumer thread that queued it
    pub fn execute(self, session: &Session) -> DeliveryOutcome {
        match self {
            Delivery::Results {
                query,
                results,
                expected_version,
            } => {
                if query.deliver_if_current(session, results, expected_version) {
                    DeliveryOutcome::Delivered
                } else {
                    DeliveryOutcome::Skipped
                }
            }
            Delivery::Error { query, error } => {
                if query.report_error(error) {
                    DeliveryOutcome::ErrorReported
                } else {
                    DeliveryOutcome::AlreadyReported
                }
            }
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::Results {
                query,
                results,
                expected_version,
            } => f
                .debug_struct("Results")
                .field("query", &query.id())
                .field("rows", &results.len())
                .field("expected_version", expected_version)
                .finish(),
            Delivery::Error { query, error } => f
                .debug_struct("Error")
                .field("query", &query.id())
                .field("error", error)
                .finish(),
        }
    }
}

/// Totals from running a queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl DeliveryReport {
    fn record(&mut self, outcome: DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Delivered => self.delivered += 1,
            DeliveryOutcome::Skipped => self.skipped += 1,
            DeliveryOutcome::ErrorReported => self.errors += 1,
            DeliveryOutcome::AlreadyReported => {}
        }
    }
}

/// Deliveries collected for one consumer, run in FIFO order
#[derive(Debug, Default)]
pub struct DeliveryQueue {
    items: VecDeque<Delivery>,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delivery: Delivery) {
        self.items.push_back(delivery);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Delivery> {
        self.items.iter()
    }

    /// Execute and drain every queued delivery against `session`
    pub fn run(&mut self, session: &Session) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        while let Some(delivery) = self.items.pop_front() {
            report.record(delivery.execute(session));
        }
        report
    }
}
