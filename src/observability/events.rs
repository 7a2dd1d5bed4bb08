//! Observability events
//!
//! Every transition of the handover protocol has a typed event. Staleness
//! events are informational: they mark expected, recoverable discards.

use std::fmt;

use super::logger::Severity;

/// Observable events of the async query lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Registration
    /// Coordinator accepted a new async query
    QueryRegistered,
    /// Query removed from the coordinator
    QueryUnregistered,

    // Worker side
    /// Query imported into a worker session
    QueryAttached,
    /// Query exported back out of its worker session
    QueryDetached,
    /// Query evaluated or re-synchronized
    QueryEvaluated,
    /// Result set exported into the pending handover
    HandoverExported,

    // Consumer side
    /// Pending handover older than the consumer; discarded
    HandoverStale,
    /// Pending handover imported into a consumer session
    ResultsImported,
    /// Results handed to the callback
    ResultsDelivered,
    /// Consumer moved on before a queued delivery ran
    DeliverySkipped,
    /// Pending handover could not be imported
    ImportFailed,

    // Errors
    /// Evaluation error latched
    ErrorCaptured,
    /// Latched error handed to the callback
    ErrorReported,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::QueryRegistered => "ASYNC_QUERY_REGISTERED",
            Event::QueryUnregistered => "ASYNC_QUERY_UNREGISTERED",
            Event::QueryAttached => "ASYNC_QUERY_ATTACHED",
            Event::QueryDetached => "ASYNC_QUERY_DETACHED",
            Event::QueryEvaluated => "ASYNC_QUERY_EVALUATED",
            Event::HandoverExported => "HANDOVER_EXPORTED",
            Event::HandoverStale => "HANDOVER_STALE",
            Event::ResultsImported => "RESULTS_IMPORTED",
            Event::ResultsDelivered => "RESULTS_DELIVERED",
            Event::DeliverySkipped => "DELIVERY_SKIPPED",
            Event::ImportFailed => "HANDOVER_IMPORT_FAILED",
            Event::ErrorCaptured => "ASYNC_QUERY_ERROR_CAPTURED",
            Event::ErrorReported => "ASYNC_QUERY_ERROR_REPORTED",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::QueryEvaluated
            | Event::HandoverExported
            | Event::HandoverStale
            | Event::ResultsImported
            | Event::ResultsDelivered
            | Event::DeliverySkipped => Severity::Trace,
            Event::QueryRegistered
            | Event::QueryUnregistered
            | Event::QueryAttached
            | Event::QueryDetached => Severity::Info,
            Event::ImportFailed | Event::ErrorCaptured => Severity::Warn,
            Event::ErrorReported => Severity::Error,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
