//! Metrics registry for async query delivery
//!
//! - Counters only
//! - Monotonic increase
//! - Thread-safe but lock-free

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters of one coordinator
///
/// Uses Relaxed ordering; counters are observational and never drive
/// protocol decisions.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    queries_registered: AtomicU64,
    queries_unregistered: AtomicU64,
    handovers_exported: AtomicU64,
    results_delivered: AtomicU64,
    stale_discarded: AtomicU64,
    deliveries_skipped: AtomicU64,
    errors_captured: AtomicU64,
    errors_reported: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_queries_registered(&self) {
        self.queries_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_queries_unregistered(&self) {
        self.queries_unregistered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_handovers_exported(&self) {
        self.handovers_exported.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_results_delivered(&self) {
        self.results_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Pending handover dropped because the consumer was already past it
    pub fn increment_stale_discarded(&self) {
        self.stale_discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Queued delivery dropped because the consumer advanced before it ran
    pub fn increment_deliveries_skipped(&self) {
        self.deliveries_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_errors_captured(&self) {
        self.errors_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_errors_reported(&self) {
        self.errors_reported.fetch_add(1, Ordering::Relaxed);
    }

    /// Current values as a JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queries_registered: self.queries_registered.load(Ordering::Relaxed),
            queries_unregistered: self.queries_unregistered.load(Ordering::Relaxed),
            handovers_exported: self.handovers_exported.load(Ordering::Relaxed),
            results_delivered: self.results_delivered.load(Ordering::Relaxed),
            stale_discarded: self.stale_discarded.load(Ordering::Relaxed),
            deliveries_skipped: self.deliveries_skipped.load(Ordering::Relaxed),
            errors_captured: self.errors_captured.load(Ordering::Relaxed),
            errors_reported: self.errors_reported.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub queries_registered: u64,
    pub queries_unregistered: u64,
    pub handovers_exported: u64,
    pub results_delivered: u64,
    pub stale_discarded: u64,
    pub deliveries_skipped: u64,
    pub errors_captured: u64,
    pub errors_reported: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_registry_has_zero_values() {
        let registry = MetricsRegistry::new();
        assert_eq!(registry.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_increment_counters() {
        let registry = MetricsRegistry::new();
        registry.increment_handovers_exported();
        registry.increment_handovers_exported();
        registry.increment_stale_discarded();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.handovers_exported, 2);
        assert_eq!(snapshot.stale_discarded, 1);
        assert_eq!(snapshot.results_delivered, 0);
    }

    #[test]
    fn test_to_json() {
        let registry = MetricsRegistry::new();
        registry.increment_results_delivered();

        let parsed: serde_json::Value = serde_json::from_str(&registry.to_json()).unwrap();
        assert_eq!(parsed["results_delivered"], 1);
        assert_eq!(parsed["errors_reported"], 0);
    }

    #[test]
    fn test_thread_safety() {
        let registry = Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..100 {
                        registry.increment_results_delivered();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.snapshot().results_delivered, 800);
    }
}
