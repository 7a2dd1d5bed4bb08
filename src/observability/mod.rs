//! Observability subsystem
//!
//! This module provides:
//! - Structured logging (JSON)
//! - Typed protocol events
//! - Lock-free counters
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on delivery decisions
//! 3. No background threads
//!
//! # Usage
//!
//! ```ignore
//! use aerolive::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::HandoverExported, &[("version", "v3")]);
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Log a lifecycle event at its own severity
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let severity = event.severity();
    if severity >= Severity::Error {
        Logger::log_stderr(severity, event.as_str(), fields);
    } else {
        Logger::log(severity, event.as_str(), fields);
    }
}
