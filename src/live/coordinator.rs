//! # Query Coordinator
//!
//! Owns the registered async queries of one store and drives them:
//! - worker threads call `run_background_cycle` with their session
//! - consumer threads call `deliver` (or `collect_results` + `run`)
//!
//! The coordinator decides nothing about *when* a cycle runs.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::async_query::{AsyncQuery, QueryId};
use super::callback::ResultCallback;
use super::config::CoordinatorConfig;
use super::delivery::{DeliveryQueue, DeliveryReport};
use super::errors::{LiveError, LiveResult};
use crate::mvcc::VersionId;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry, MetricsSnapshot};
use crate::store::{Query, Session, SortOrder, StorageError};

/// Receiver of unregistration requests from async queries
pub trait QueryRegistry: Send + Sync {
    /// Drop the registry's reference to `id`. Unknown ids are ignored.
    fn unregister(&self, id: QueryId);
}

/// Totals from one background cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Queries that ran `prepare_update` successfully
    pub evaluated: usize,
    /// Queries that published a new handover
    pub exported: usize,
    /// Queries left alone (latched, or attached elsewhere)
    pub skipped: usize,
    /// Errors routed to `capture_error`
    pub errors: usize,
}

/// Registry and driver of async queries
#[derive(Debug)]
pub struct QueryCoordinator {
    config: CoordinatorConfig,
    queries: RwLock<BTreeMap<QueryId, Arc<AsyncQuery>>>,
    metrics: Arc<MetricsRegistry>,
    self_ref: Weak<QueryCoordinator>,
}

impl QueryCoordinator {
    pub fn new(config: CoordinatorConfig) -> LiveResult<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new_cyclic(|self_ref| Self {
            config,
            queries: RwLock::new(BTreeMap::new()),
            metrics: Arc::new(MetricsRegistry::new()),
            self_ref: self_ref.clone(),
        }))
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Take ownership of `query` and start tracking it.
    ///
    /// `query` must be bound to `session`; it is moved out of it here.
    pub fn register(
        &self,
        session: &Session,
        query: Query,
        sort: SortOrder,
        callback: Arc<dyn ResultCallback>,
    ) -> LiveResult<Arc<AsyncQuery>> {
        if query.session_id() != session.id() {
            return Err(StorageError::SessionMismatch {
                bound: query.session_id(),
                used: session.id(),
            }
            .into());
        }

        let mut queries = self.queries.write();
        if queries.len() >= self.config.max_queries {
            return Err(LiveError::TooManyQueries(self.config.max_queries));
        }

        let collection = query.collection().to_string();
        let registry: Weak<dyn QueryRegistry> = self.self_ref.clone();
        let async_query = AsyncQuery::new(
            sort,
            session.export_move(query),
            callback,
            registry,
            Arc::clone(&self.metrics),
        );
        queries.insert(async_query.id(), Arc::clone(&async_query));
        drop(queries);

        self.metrics.increment_queries_registered();
        log_event_with_fields(
            Event::QueryRegistered,
            &[
                ("collection", collection.as_str()),
                ("query_id", async_query.id().to_string().as_str()),
                ("version", session.current_version().to_string().as_str()),
            ],
        );
        Ok(async_query)
    }

    pub fn get(&self, id: QueryId) -> Option<Arc<AsyncQuery>> {
        self.queries.read().get(&id).cloned()
    }

    pub fn registered(&self) -> usize {
        self.queries.read().len()
    }

    /// Oldest version any registered query is at; `None` if none report one
    pub fn oldest_version(&self) -> Option<VersionId> {
        self.snapshot()
            .iter()
            .filter_map(|query| query.current_version())
            .min()
    }

    /// Evaluate every query this worker may run and publish the results.
    ///
    /// Unattached queries are attached to `worker` first. Errors are latched
    /// on the query that raised them.
    pub fn run_background_cycle(&self, worker: &Session) -> CycleReport {
        let mut report = CycleReport::default();

        for query in self.snapshot() {
            if query.has_error() && self.config.skip_evaluation_after_error {
                report.skipped += 1;
                continue;
            }

            match query.try_attach(worker) {
                None => {
                    report.skipped += 1;
                    continue;
                }
                Some(Err(err)) => {
                    query.capture_error(err);
                    report.errors += 1;
                    continue;
                }
                Some(Ok(())) => {}
            }

            if let Err(err) = query.prepare_update(worker) {
                query.capture_error(err);
                report.errors += 1;
                continue;
            }
            report.evaluated += 1;

            if query.prepare_handover(worker) {
                report.exported += 1;
            }
        }

        report
    }

    /// Detach every query attached to `worker`. Returns how many were.
    pub fn release_session(&self, worker: &Session) -> usize {
        let mut released = 0;
        for query in self.snapshot() {
            if query.try_detach(worker) {
                released += 1;
            }
        }
        released
    }

    /// Gather deliveries for `consumer` from every query
    pub fn collect_results(&self, consumer: &Session) -> DeliveryQueue {
        let mut queue = DeliveryQueue::new();
        for query in self.snapshot() {
            query.get_results(consumer, &mut queue);
        }
        queue
    }

    /// Collect and immediately run deliveries for `consumer`
    pub fn deliver(&self, consumer: &Session) -> DeliveryReport {
        self.collect_results(consumer).run(consumer)
    }

    // Deliveries may call back into `unregister`, so the map lock is never
    // held while queries run.
    fn snapshot(&self) -> Vec<Arc<AsyncQuery>> {
        self.queries.read().values().cloned().collect()
    }
}

impl QueryRegistry for QueryCoordinator {
    fn unregister(&self, id: QueryId) {
        if self.queries.write().remove(&id).is_some() {
            self.metrics.increment_queries_unregistered();
            log_event_with_fields(
                Event::QueryUnregistered,
                &[("query_id", id.to_string().as_str())],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::ChannelCallback;
    use crate::store::{Store, WriteBatch};
    use serde_json::json;

    fn setup() -> (Arc<Store>, Session, Arc<QueryCoordinator>) {
        let store = Store::new();
        store.create_collection("items").unwrap();
        store
            .commit(WriteBatch::new().put("items", "a", json!({"n": 1})))
            .unwrap();
        let session = Session::open(&store);
        let coordinator = QueryCoordinator::new(CoordinatorConfig::default()).unwrap();
        (store, session, coordinator)
    }

    fn register(coordinator: &QueryCoordinator, session: &Session) -> Arc<AsyncQuery> {
        let (callback, _rx) = ChannelCallback::for_current_thread();
        coordinator
            .register(session, session.query("items"), SortOrder::none(), Arc::new(callback))
            .unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let err = QueryCoordinator::new(CoordinatorConfig::with_max_queries(0)).unwrap_err();
        assert!(matches!(err, LiveError::InvalidConfig(_)));
    }

    #[test]
    fn test_register_enforces_limit() {
        let (_store, session, _) = setup();
        let coordinator = QueryCoordinator::new(CoordinatorConfig::with_max_queries(1)).unwrap();
        register(&coordinator, &session);

        let (callback, _rx) = ChannelCallback::for_current_thread();
        let err = coordinator
            .register(&session, session.query("items"), SortOrder::none(), Arc::new(callback))
            .unwrap_err();
        assert_eq!(err, LiveError::TooManyQueries(1));
        assert_eq!(coordinator.registered(), 1);
    }

    #[test]
    fn test_register_rejects_query_from_other_session() {
        let (store, session, coordinator) = setup();
        let other = Session::open(&store);
        let (callback, _rx) = ChannelCallback::for_current_thread();

        let err = coordinator
            .register(&other, session.query("items"), SortOrder::none(), Arc::new(callback))
            .unwrap_err();
        assert_eq!(err.code(), "AERO_SESSION_MISMATCH");
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let (_store, session, coordinator) = setup();
        let query = register(&coordinator, &session);

        coordinator.unregister(query.id());
        coordinator.unregister(query.id());

        assert_eq!(coordinator.registered(), 0);
        assert_eq!(coordinator.metrics().queries_unregistered, 1);
    }

    #[test]
    fn test_cycle_skips_queries_attached_elsewhere() {
        let (store, session, coordinator) = setup();
        register(&coordinator, &session);
        let worker_a = Session::open(&store);
        let worker_b = Session::open(&store);

        assert_eq!(coordinator.run_background_cycle(&worker_a).exported, 1);
        let report = coordinator.run_background_cycle(&worker_b);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.evaluated, 0);
    }

    #[test]
    fn test_oldest_version() {
        let (store, session, coordinator) = setup();
        assert_eq!(coordinator.oldest_version(), None);

        register(&coordinator, &session);
        store
            .commit(WriteBatch::new().put("items", "b", json!({"n": 2})))
            .unwrap();
        let later = Session::open(&store);
        register(&coordinator, &later);

        assert_eq!(coordinator.oldest_version(), Some(session.current_version()));
    }
}
