//! # Async Queries
//!
//! An `AsyncQuery` evaluates a query on a background worker session and
//! hands the resulting view to consumer sessions on other threads.
//!
//! ## Worker side
//!
//! `attach → prepare_update → prepare_handover`, always on the thread that
//! owns the attached session. Evaluation happens under the worker lock only;
//! consumers never take it.
//!
//! ## Consumer side
//!
//! `get_results` inspects the pending handover under the handover lock and
//! queues at most one `Delivery` per call. The queued delivery re-checks the
//! consumer's version when it runs, so a consumer that advanced in between
//! never sees out-of-date rows.
//!
//! ## Locks
//!
//! The worker lock is always taken before the handover lock. Consumers only
//! ever take the handover lock, and nothing is evaluated while it is held.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::callback::ResultCallback;
use super::captured::CapturedError;
use super::coordinator::QueryRegistry;
use super::delivery::{Delivery, DeliveryQueue};
use super::results::Results;
use crate::mvcc::VersionId;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::store::{
    Handover, Query, Rejected, Session, SessionId, SortOrder, StorageError, StorageResult,
    TableView,
};

static NEXT_QUERY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an async query
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryId(u64);

impl QueryId {
    fn next() -> Self {
        Self(NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// Live query bound to the worker session that imported it
#[derive(Debug)]
struct Binding {
    session: SessionId,
    query: Query,
}

/// State owned by the attached worker thread
#[derive(Debug)]
struct WorkerState {
    binding: Option<Binding>,
    view: TableView,
    did_update: bool,
}

/// The exported view plus the consumer sessions that already imported it
#[derive(Debug)]
struct PendingHandover {
    handover: Handover<TableView>,
    consumed_by: HashSet<SessionId>,
}

/// State shared between the worker and consumer threads
#[derive(Debug)]
struct HandoverState {
    query_handover: Option<Handover<Query>>,
    pending: Option<PendingHandover>,
    error: Option<CapturedError>,
}

/// Result of one `get_results` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Callback does not accept this thread
    WrongThread,
    /// Error delivery queued
    Error,
    /// Nothing exported yet
    NothingPending,
    /// Pending handover is older than the consumer
    Stale,
    /// This session already imported the pending version
    AlreadyConsumed,
    /// Pending handover could not be imported into the session
    ImportFailed,
    /// Results delivery queued
    Queued,
}

/// Background evaluator for one query and one callback
pub struct AsyncQuery {
    id: QueryId,
    sort: SortOrder,
    callback: Arc<dyn ResultCallback>,
    registry: Weak<dyn QueryRegistry>,
    metrics: Arc<MetricsRegistry>,
    worker: Mutex<WorkerState>,
    handover: Mutex<HandoverState>,
    error_latched: AtomicBool,
    error_reported: AtomicBool,
}

impl AsyncQuery {
    /// Build an evaluator around a query exported with `Session::export_move`.
    ///
    /// `registry` is only used to request unregistration after an error has
    /// been reported; it never keeps the registry alive.
    pub fn new(
        sort: SortOrder,
        query: Handover<Query>,
        callback: Arc<dyn ResultCallback>,
        registry: Weak<dyn QueryRegistry>,
        metrics: Arc<MetricsRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: QueryId::next(),
            sort,
            callback,
            registry,
            metrics,
            worker: Mutex::new(WorkerState {
                binding: None,
                view: TableView::detached(),
                did_update: false,
            }),
            handover: Mutex::new(HandoverState {
                query_handover: Some(query),
                pending: None,
                error: None,
            }),
            error_latched: AtomicBool::new(false),
            error_reported: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> QueryId {
        self.id
    }

    pub fn sort_order(&self) -> &SortOrder {
        &self.sort
    }

    pub fn is_attached(&self) -> bool {
        self.worker.lock().binding.is_some()
    }

    /// Worker session the query is currently imported into
    pub fn attached_session(&self) -> Option<SessionId> {
        self.worker.lock().binding.as_ref().map(|b| b.session)
    }

    pub fn has_error(&self) -> bool {
        self.error_latched.load(Ordering::Acquire)
    }

    pub fn error(&self) -> Option<CapturedError> {
        self.handover.lock().error.clone()
    }

    // ==================
    // Worker side
    // ==================

    /// Import the query into `session`.
    ///
    /// # Panics
    ///
    /// If the query is already attached.
    pub fn attach(&self, session: &Session) -> StorageResult<()> {
        let mut worker = self.worker.lock();
        if let Some(binding) = &worker.binding {
            panic!(
                "async query {} attached to session {} while already attached to {}",
                self.id,
                session.id(),
                binding.session
            );
        }
        self.attach_locked(&mut worker, session)
    }

    /// Make sure the query is attached to `session`, importing it if it is
    /// free. The check and the import happen under one worker lock, so
    /// workers racing for the same query never both attach it.
    ///
    /// Returns `None` if another session holds the query.
    pub fn try_attach(&self, session: &Session) -> Option<StorageResult<()>> {
        let mut worker = self.worker.lock();
        match &worker.binding {
            Some(binding) if binding.session == session.id() => Some(Ok(())),
            Some(_) => None,
            None => Some(self.attach_locked(&mut worker, session)),
        }
    }

    fn attach_locked(&self, worker: &mut WorkerState, session: &Session) -> StorageResult<()> {
        let envelope = self.handover.lock().query_handover.take().ok_or_else(|| {
            StorageError::Internal(format!("async query {} has no query to attach", self.id))
        })?;

        // A rejected envelope goes back in place for another session.
        let query = match session.try_import(envelope) {
            Ok(query) => query,
            Err(Rejected(err, envelope)) => {
                self.handover.lock().query_handover = Some(envelope);
                return Err(err);
            }
        };

        worker.binding = Some(Binding {
            session: session.id(),
            query,
        });

        log_event_with_fields(
            Event::QueryAttached,
            &[
                ("query_id", self.id.to_string().as_str()),
                ("session_id", session.id().to_string().as_str()),
                ("version", session.current_version().to_string().as_str()),
            ],
        );
        Ok(())
    }

    /// Move the live query back into an envelope and release `session`.
    ///
    /// The result view is dropped with it; the next attach evaluates fresh.
    ///
    /// # Panics
    ///
    /// If the query is not attached to `session`.
    pub fn detach(&self, session: &Session) {
        let mut worker = self.worker.lock();
        match &worker.binding {
            None => panic!("async query {} detached while not attached", self.id),
            Some(binding) if binding.session != session.id() => panic!(
                "async query {} detached from session {} but is attached to {}",
                self.id,
                session.id(),
                binding.session
            ),
            Some(_) => self.detach_locked(&mut worker, session),
        }
    }

    /// Detach only if `session` holds the query. Returns whether it did.
    pub fn try_detach(&self, session: &Session) -> bool {
        let mut worker = self.worker.lock();
        match &worker.binding {
            Some(binding) if binding.session == session.id() => {
                self.detach_locked(&mut worker, session);
                true
            }
            _ => false,
        }
    }

    fn detach_locked(&self, worker: &mut WorkerState, session: &Session) {
        let binding = match worker.binding.take() {
            Some(binding) => binding,
            None => return,
        };

        let envelope = session.export_move(binding.query);
        worker.view = TableView::detached();
        worker.did_update = false;
        self.handover.lock().query_handover = Some(envelope);

        log_event_with_fields(
            Event::QueryDetached,
            &[
                ("query_id", self.id.to_string().as_str()),
                ("session_id", session.id().to_string().as_str()),
            ],
        );
    }

    /// Evaluate or re-synchronize the view at the session's snapshot.
    ///
    /// Returns whether the view changed. Never touches the pending handover.
    ///
    /// # Panics
    ///
    /// If the query is not attached to `session`.
    pub fn prepare_update(&self, session: &Session) -> StorageResult<bool> {
        if self.has_error() {
            return Ok(false);
        }

        let mut guard = self.worker.lock();
        let worker = &mut *guard;
        let binding = Self::binding_for(self.id, &worker.binding, session, "prepare_update");

        worker.did_update = false;
        let did_update = if worker.view.is_attached() {
            worker.view.sync_if_needed(session)?
        } else {
            let mut view = binding.query.find_all(session)?;
            if !self.sort.is_empty() {
                view.sort(&self.sort);
            }
            worker.view = view;
            true
        };
        worker.did_update = did_update;

        log_event_with_fields(
            Event::QueryEvaluated,
            &[
                ("changed", if did_update { "true" } else { "false" }),
                ("query_id", self.id.to_string().as_str()),
                ("rows", worker.view.len().to_string().as_str()),
                ("version", session.current_version().to_string().as_str()),
            ],
        );
        Ok(did_update)
    }

    /// Publish the view for consumers if it changed, or if the unconsumed
    /// export no longer matches the session's version.
    ///
    /// Returns whether a new handover was exported.
    ///
    /// # Panics
    ///
    /// If the query is not attached to `session`.
    pub fn prepare_handover(&self, session: &Session) -> bool {
        if self.has_error() {
            return false;
        }

        let worker = self.worker.lock();
        Self::binding_for(self.id, &worker.binding, session, "prepare_handover");

        let version = session.current_version();
        let pending_outdated = self
            .handover
            .lock()
            .pending
            .as_ref()
            .map_or(false, |p| p.handover.version() != version);

        if !worker.did_update && !pending_outdated {
            return false;
        }

        // Only this thread replaces the pending handover, so the decision
        // above still holds after the export.
        let handover = session.export_copy(&worker.view);
        drop(worker);

        self.handover.lock().pending = Some(PendingHandover {
            handover,
            consumed_by: HashSet::new(),
        });

        self.metrics.increment_handovers_exported();
        log_event_with_fields(
            Event::HandoverExported,
            &[
                ("query_id", self.id.to_string().as_str()),
                ("version", version.to_string().as_str()),
            ],
        );
        self.callback.update_ready();
        true
    }

    /// Latch `error`. Only the first call has an effect.
    ///
    /// Returns whether this call latched the error.
    pub fn capture_error(&self, error: impl Into<CapturedError>) -> bool {
        let error = error.into();
        {
            let mut state = self.handover.lock();
            if state.error.is_some() {
                return false;
            }
            state.error = Some(error.clone());
            self.error_latched.store(true, Ordering::Release);
        }

        self.metrics.increment_errors_captured();
        log_event_with_fields(
            Event::ErrorCaptured,
            &[
                ("error", error.message().as_str()),
                ("query_id", self.id.to_string().as_str()),
            ],
        );
        self.callback.update_ready();
        true
    }

    /// Version of the pending handover, else of the query envelope.
    ///
    /// `None` while attached with nothing exported yet.
    pub fn current_version(&self) -> Option<VersionId> {
        let state = self.handover.lock();
        state
            .pending
            .as_ref()
            .map(|p| p.handover.version())
            .or_else(|| state.query_handover.as_ref().map(Handover::version))
    }

    fn binding_for<'a>(
        id: QueryId,
        binding: &'a Option<Binding>,
        session: &Session,
        operation: &str,
    ) -> &'a Binding {
        match binding {
            Some(binding) if binding.session == session.id() => binding,
            Some(binding) => panic!(
                "{} on async query {} with session {} but it is attached to {}",
                operation,
                id,
                session.id(),
                binding.session
            ),
            None => panic!("{} on unattached async query {}", operation, id),
        }
    }

    // ==================
    // Consumer side
    // ==================

    /// Queue whatever `session` should receive next.
    ///
    /// Run the queue later on the same thread with `DeliveryQueue::run`.
    pub fn get_results(self: &Arc<Self>, session: &Session, queue: &mut DeliveryQueue) -> GateDecision {
        if !self.callback.is_for_current_thread() {
            return GateDecision::WrongThread;
        }

        let version = session.current_version();
        let handover = {
            let mut state = self.handover.lock();

            if let Some(error) = &state.error {
                queue.push(Delivery::Error {
                    query: Arc::clone(self),
                    error: error.clone(),
                });
                return GateDecision::Error;
            }

            let pending = match state.pending.as_mut() {
                Some(pending) => pending,
                None => return GateDecision::NothingPending,
            };

            if pending.handover.version() < version {
                drop(state);
                self.metrics.increment_stale_discarded();
                log_event_with_fields(
                    Event::HandoverStale,
                    &[
                        ("query_id", self.id.to_string().as_str()),
                        ("session_version", version.to_string().as_str()),
                    ],
                );
                return GateDecision::Stale;
            }

            if pending.consumed_by.contains(&session.id()) {
                return GateDecision::AlreadyConsumed;
            }
            // Pending views are always exported in copy mode.
            let handover = match pending.handover.try_clone() {
                Some(handover) => handover,
                None => return GateDecision::ImportFailed,
            };
            pending.consumed_by.insert(session.id());
            handover
        };

        let view = match session.import(handover) {
            Ok(view) => view,
            Err(err) => {
                log_event_with_fields(
                    Event::ImportFailed,
                    &[
                        ("code", err.code()),
                        ("error", err.to_string().as_str()),
                        ("query_id", self.id.to_string().as_str()),
                    ],
                );
                return GateDecision::ImportFailed;
            }
        };

        log_event_with_fields(
            Event::ResultsImported,
            &[
                ("query_id", self.id.to_string().as_str()),
                ("session_id", session.id().to_string().as_str()),
                ("version", version.to_string().as_str()),
            ],
        );
        queue.push(Delivery::Results {
            query: Arc::clone(self),
            results: Results::new(view, self.sort.clone()),
            expected_version: version,
        });
        GateDecision::Queued
    }

    /// Hand `results` to the callback if `session` is still at `expected`.
    pub(crate) fn deliver_if_current(
        &self,
        session: &Session,
        results: Results,
        expected: VersionId,
    ) -> bool {
        let current = session.current_version();
        if current != expected {
            self.metrics.increment_deliveries_skipped();
            log_event_with_fields(
                Event::DeliverySkipped,
                &[
                    ("expected_version", expected.to_string().as_str()),
                    ("query_id", self.id.to_string().as_str()),
                    ("session_version", current.to_string().as_str()),
                ],
            );
            return false;
        }

        self.callback.deliver(results);
        self.metrics.increment_results_delivered();
        log_event_with_fields(
            Event::ResultsDelivered,
            &[
                ("query_id", self.id.to_string().as_str()),
                ("version", expected.to_string().as_str()),
            ],
        );
        true
    }

    /// Report `error` to the callback and ask the registry to drop this
    /// query. Only the first call across all threads does anything.
    pub(crate) fn report_error(&self, error: CapturedError) -> bool {
        if self
            .error_reported
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        self.callback.error(error.clone());
        self.metrics.increment_errors_reported();
        log_event_with_fields(
            Event::ErrorReported,
            &[
                ("error", error.message().as_str()),
                ("query_id", self.id.to_string().as_str()),
            ],
        );

        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
        true
    }
}

impl fmt::Debug for AsyncQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncQuery")
            .field("id", &self.id)
            .field("sort", &self.sort)
            .field("error_latched", &self.has_error())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::{CallbackEvent, ChannelCallback};
    use crate::store::{Store, WriteBatch};
    use serde_json::json;

    struct NoRegistry;

    impl QueryRegistry for NoRegistry {
        fn unregister(&self, _id: QueryId) {}
    }

    fn setup() -> (Arc<Store>, Session) {
        let store = Store::new();
        store.create_collection("items").unwrap();
        store
            .commit(WriteBatch::new().put("items", "a", json!({"n": 1})))
            .unwrap();
        let session = Session::open(&store);
        (store, session)
    }

    fn build(
        session: &Session,
    ) -> (
        Arc<AsyncQuery>,
        tokio::sync::mpsc::UnboundedReceiver<CallbackEvent>,
    ) {
        let (callback, rx) = ChannelCallback::for_current_thread();
        let registry: Weak<dyn QueryRegistry> = Weak::<NoRegistry>::new();
        let query = AsyncQuery::new(
            SortOrder::none(),
            session.export_move(session.query("items")),
            Arc::new(callback),
            registry,
            Arc::new(MetricsRegistry::new()),
        );
        (query, rx)
    }

    #[test]
    fn test_query_ids_are_unique() {
        assert_ne!(QueryId::next(), QueryId::next());
    }

    #[test]
    fn test_current_version_tracks_envelopes() {
        let (_store, owner) = setup();
        let (query, _rx) = build(&owner);
        assert_eq!(query.current_version(), Some(owner.current_version()));

        let worker = Session::open(owner.store());
        query.attach(&worker).unwrap();
        assert_eq!(query.current_version(), None);

        query.prepare_update(&worker).unwrap();
        query.prepare_handover(&worker);
        assert_eq!(query.current_version(), Some(worker.current_version()));
    }

    #[test]
    fn test_detach_returns_query_to_envelope() {
        let (_store, owner) = setup();
        let (query, _rx) = build(&owner);
        let worker = Session::open(owner.store());

        query.attach(&worker).unwrap();
        assert_eq!(query.attached_session(), Some(worker.id()));
        query.detach(&worker);

        assert!(!query.is_attached());
        assert_eq!(query.current_version(), Some(worker.current_version()));
        query.attach(&worker).unwrap();
        assert!(query.prepare_update(&worker).unwrap());
    }

    #[test]
    #[should_panic(expected = "already attached")]
    fn test_double_attach_panics() {
        let (_store, owner) = setup();
        let (query, _rx) = build(&owner);
        let worker = Session::open(owner.store());
        query.attach(&worker).unwrap();
        let _ = query.attach(&worker);
    }

    #[test]
    #[should_panic(expected = "not attached")]
    fn test_detach_unattached_panics() {
        let (_store, owner) = setup();
        let (query, _rx) = build(&owner);
        query.detach(&owner);
    }

    #[test]
    #[should_panic(expected = "prepare_update")]
    fn test_prepare_with_other_session_panics() {
        let (_store, owner) = setup();
        let (query, _rx) = build(&owner);
        let worker = Session::open(owner.store());
        query.attach(&worker).unwrap();
        let _ = query.prepare_update(&owner);
    }

    #[test]
    fn test_failed_attach_keeps_envelope() {
        let (_store, owner) = setup();
        let (query, _rx) = build(&owner);
        let other_store = Store::new();
        let foreign = Session::open(&other_store);

        let err = query.attach(&foreign).unwrap_err();
        assert!(matches!(err, StorageError::ForeignHandover { .. }));
        assert!(query.current_version().is_some());

        let worker = Session::open(owner.store());
        query.attach(&worker).unwrap();
    }

    #[test]
    fn test_try_attach_leaves_other_sessions_query_alone() {
        let (_store, owner) = setup();
        let (query, _rx) = build(&owner);
        let first = Session::open(owner.store());
        let second = Session::open(owner.store());

        assert!(matches!(query.try_attach(&first), Some(Ok(()))));
        assert!(query.try_attach(&second).is_none());
        assert!(matches!(query.try_attach(&first), Some(Ok(()))));
        assert_eq!(query.attached_session(), Some(first.id()));

        assert!(!query.try_detach(&second));
        assert!(query.try_detach(&first));
        assert!(!query.try_detach(&first));
        assert!(matches!(query.try_attach(&second), Some(Ok(()))));
    }

    #[test]
    fn test_failed_try_attach_keeps_envelope() {
        let (_store, owner) = setup();
        let (query, _rx) = build(&owner);
        let other_store = Store::new();
        let foreign = Session::open(&other_store);

        assert!(matches!(
            query.try_attach(&foreign),
            Some(Err(StorageError::ForeignHandover { .. }))
        ));
        assert!(!query.is_attached());

        let worker = Session::open(owner.store());
        assert!(matches!(query.try_attach(&worker), Some(Ok(()))));
    }

    #[test]
    fn test_export_signals_update_ready() {
        let (_store, owner) = setup();
        let (query, mut rx) = build(&owner);
        let worker = Session::open(owner.store());
        query.attach(&worker).unwrap();

        assert!(query.prepare_update(&worker).unwrap());
        assert!(query.prepare_handover(&worker));
        assert!(matches!(rx.try_recv(), Ok(CallbackEvent::UpdateReady)));

        assert!(!query.prepare_update(&worker).unwrap());
        assert!(!query.prepare_handover(&worker));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_capture_error_is_idempotent() {
        let (_store, owner) = setup();
        let (query, mut rx) = build(&owner);

        assert!(query.capture_error(StorageError::Internal("first".into())));
        assert!(!query.capture_error(StorageError::Internal("second".into())));

        assert_eq!(
            query.error().map(|e| e.message()),
            Some("Internal error: first".to_string())
        );
        assert!(matches!(rx.try_recv(), Ok(CallbackEvent::UpdateReady)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_latched_error_short_circuits_worker() {
        let (_store, owner) = setup();
        let (query, _rx) = build(&owner);
        let worker = Session::open(owner.store());
        query.attach(&worker).unwrap();
        query.capture_error(StorageError::Internal("boom".into()));

        assert!(!query.prepare_update(&worker).unwrap());
        assert!(!query.prepare_handover(&worker));
        assert_eq!(query.current_version(), None);
    }
}
