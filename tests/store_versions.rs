//! Versioned Store Tests
//!
//! Snapshot semantics the handover protocol relies on:
//! - Visibility selects the largest commit within the read bound
//! - Tombstones hide a key from their commit onward
//! - Sessions read one snapshot until they advance, and never go back
//! - Layout changes bump the epoch

use aerolive::mvcc::{CommitAuthority, ReadView, Version, VersionChain, VersionId, Visibility};
use aerolive::store::{
    PayloadMode, Predicate, Query, Rejected, Session, SortOrder, SortSpec, StorageError, Store,
    WriteBatch,
};
use serde_json::json;

// =============================================================================
// Helper Functions
// =============================================================================

fn make_version(key: &str, n: i64, commit: u64) -> Version {
    Version::with_document(key, json!({ "n": n }), VersionId::new(commit))
}

fn make_tombstone(key: &str, commit: u64) -> Version {
    Version::with_tombstone(key, VersionId::new(commit))
}

fn keys(session: &Session, collection: &str) -> Vec<String> {
    session
        .query(collection)
        .find_all(session)
        .unwrap()
        .rows()
        .iter()
        .map(|row| row.key.clone())
        .collect()
}

// =============================================================================
// Visibility Tests
// =============================================================================

/// Visibility selects largest commit ≤ read bound.
#[test]
fn test_visibility_rule_largest_within_bound() {
    let mut chain = VersionChain::new("key");
    chain.push(make_version("key", 1, 1));
    chain.push(make_version("key", 5, 5));
    chain.push(make_version("key", 10, 10));

    let view = ReadView::new(VersionId::new(7));
    let version = Visibility::visible_version(&chain, view).unwrap();

    assert_eq!(version.commit(), VersionId::new(5));
}

/// All versions in future = invisible.
#[test]
fn test_all_future_invisible() {
    let mut chain = VersionChain::new("key");
    chain.push(make_version("key", 10, 10));

    assert!(Visibility::visible_version(&chain, ReadView::new(VersionId::new(5))).is_none());
}

/// View before the tombstone still sees the data.
#[test]
fn test_tombstone_boundaries() {
    let mut chain = VersionChain::new("key");
    chain.push(make_version("key", 1, 1));
    chain.push(make_tombstone("key", 5));
    chain.push(make_version("key", 2, 8));

    assert!(Visibility::visible_version(&chain, ReadView::new(VersionId::new(4))).is_some());
    assert!(Visibility::visible_version(&chain, ReadView::new(VersionId::new(5))).is_none());
    assert!(Visibility::visible_version(&chain, ReadView::new(VersionId::new(7))).is_none());
    assert_eq!(
        Visibility::visible_version(&chain, ReadView::new(VersionId::new(8)))
            .unwrap()
            .commit(),
        VersionId::new(8)
    );
}

/// Views at increasing bounds see non-decreasing commits.
#[test]
fn test_monotonic_views_monotonic_versions() {
    let mut chain = VersionChain::new("key");
    chain.push(make_version("key", 1, 1));
    chain.push(make_version("key", 5, 5));
    chain.push(make_version("key", 10, 10));

    let mut last_commit = VersionId::INITIAL;
    for bound in [1, 5, 7, 10, 15] {
        if let Some(version) = Visibility::visible_version(&chain, ReadView::new(VersionId::new(bound))) {
            assert!(version.commit() >= last_commit);
            last_commit = version.commit();
        }
    }
}

// =============================================================================
// Commit Authority Tests
// =============================================================================

/// Versions are strictly monotonic.
#[test]
fn test_commits_strictly_monotonic() {
    let mut authority = CommitAuthority::new();
    assert_eq!(authority.latest(), VersionId::INITIAL);

    for i in 1..=10 {
        let next = authority.next_version();
        assert_eq!(next, VersionId::new(i));
        authority.mark_committed(next).unwrap();
        assert_eq!(authority.latest(), VersionId::new(i));
    }
}

/// Cannot commit out of order.
#[test]
fn test_cannot_commit_out_of_order() {
    let mut authority = CommitAuthority::new();
    assert!(authority.mark_committed(VersionId::new(5)).is_err());
    assert_eq!(authority.latest(), VersionId::INITIAL);
}

// =============================================================================
// Store and Session Tests
// =============================================================================

/// A session keeps reading its snapshot while others commit.
#[test]
fn test_snapshot_isolation_across_sessions() {
    let store = Store::new();
    store.create_collection("posts").unwrap();
    let mut writer = Session::open(&store);
    let mut reader = Session::open(&store);

    writer
        .write(WriteBatch::new().put("posts", "a", json!({"n": 1})))
        .unwrap();
    assert!(keys(&reader, "posts").is_empty());

    reader.advance_read();
    assert_eq!(keys(&reader, "posts"), vec!["a"]);
    assert_eq!(reader.current_version(), writer.current_version());
}

/// A batch is one version: all writes or none.
#[test]
fn test_batch_is_atomic() {
    let store = Store::new();
    store.create_collection("posts").unwrap();
    let before = store.latest_version();

    let err = store
        .commit(
            WriteBatch::new()
                .put("posts", "a", json!({}))
                .put("missing", "b", json!({})),
        )
        .unwrap_err();

    assert_eq!(err, StorageError::CollectionNotFound("missing".into()));
    assert_eq!(store.latest_version(), before);
    assert!(keys(&Session::open(&store), "posts").is_empty());
}

/// Deletes hide the key from the deleting version onward.
#[test]
fn test_delete_hides_key_at_later_snapshots_only() {
    let store = Store::new();
    store.create_collection("posts").unwrap();
    let v_put = store
        .commit(WriteBatch::new().put("posts", "a", json!({"n": 1})))
        .unwrap();
    store.commit(WriteBatch::new().delete("posts", "a")).unwrap();

    let old = Session::open_at(&store, v_put).unwrap();
    let new = Session::open(&store);

    assert_eq!(keys(&old, "posts"), vec!["a"]);
    assert!(keys(&new, "posts").is_empty());
}

/// Sessions never move backwards.
#[test]
fn test_session_version_only_advances() {
    let store = Store::new();
    store.create_collection("posts").unwrap();
    store.commit(WriteBatch::new().put("posts", "a", json!({}))).unwrap();
    let mut session = Session::open(&store);
    let at = session.current_version();

    assert!(matches!(
        session.advance_to(VersionId::new(at.value() - 1)),
        Err(StorageError::InvalidVersion { .. })
    ));
    assert_eq!(session.current_version(), at);
}

/// Layout changes bump the epoch and commit.
#[test]
fn test_layout_changes_bump_epoch() {
    let store = Store::new();
    let v1 = store.create_collection("posts").unwrap();
    assert_eq!(store.layout_epoch(), 1);

    let v2 = store.drop_collection("posts").unwrap();
    assert_eq!(store.layout_epoch(), 2);
    assert!(v2 > v1);
    assert!(!store.has_collection("posts"));

    let session = Session::open(&store);
    assert!(matches!(
        session.query("posts").find_all(&session),
        Err(StorageError::CollectionNotFound(_))
    ));
}

/// A session pinned before a drop keeps reading the dropped collection.
#[test]
fn test_drop_is_invisible_to_older_snapshots() {
    let store = Store::new();
    store.create_collection("posts").unwrap();
    store
        .commit(WriteBatch::new().put("posts", "a", json!({"n": 1})))
        .unwrap();
    let mut pinned = Session::open(&store);
    let mut view = pinned.query("posts").find_all(&pinned).unwrap();

    store.drop_collection("posts").unwrap();

    assert_eq!(keys(&pinned, "posts"), vec!["a"]);
    assert!(!view.sync_if_needed(&pinned).unwrap());

    pinned.advance_read();
    assert!(matches!(
        view.sync_if_needed(&pinned),
        Err(StorageError::CollectionNotFound(_))
    ));
}

/// Filtered, sorted views re-sync when new matching rows commit.
#[test]
fn test_filtered_sorted_view_resyncs() {
    let store = Store::new();
    store.create_collection("scores").unwrap();
    let mut session = Session::open(&store);
    session
        .write(
            WriteBatch::new()
                .put("scores", "a", json!({"score": 10}))
                .put("scores", "b", json!({"score": 30}))
                .put("scores", "c", json!({"score": 3})),
        )
        .unwrap();

    let order = SortOrder::none().then(SortSpec::desc("score"));
    let mut view = session
        .query("scores")
        .filter(Predicate::gte("score", json!(5)))
        .find_all(&session)
        .unwrap();
    view.sort(&order);
    assert_eq!(view.len(), 2);

    session
        .write(WriteBatch::new().put("scores", "d", json!({"score": 20})))
        .unwrap();
    assert!(view.sync_if_needed(&session).unwrap());

    let ordered: Vec<_> = view.rows().iter().map(|r| r.key.as_str()).collect();
    assert_eq!(ordered, vec!["b", "d", "a"]);

    session
        .write(WriteBatch::new().put("scores", "e", json!({"score": 1})))
        .unwrap();
    assert!(!view.sync_if_needed(&session).unwrap());
    assert_eq!(view.version(), session.current_version());
}

// =============================================================================
// Handover Envelope Tests
// =============================================================================

/// A moved query has exactly one envelope: it cannot be cloned, and a
/// rejected import hands the same envelope back instead of losing it.
#[test]
fn test_move_envelope_is_live_on_one_session_only() {
    let store = Store::new();
    store.create_collection("items").unwrap();
    let foreign_store = Store::new();
    let owner = Session::open(&store);
    let a = Session::open(&store);
    let foreign = Session::open(&foreign_store);

    let envelope = owner.export_move(owner.query("items"));
    assert_eq!(envelope.mode(), PayloadMode::Move);
    assert!(envelope.try_clone().is_none());

    let Rejected(err, envelope) = foreign.try_import(envelope).unwrap_err();
    assert!(matches!(err, StorageError::ForeignHandover { .. }));

    let query: Query = a.import(envelope).unwrap();
    assert_eq!(query.session_id(), a.id());
}
