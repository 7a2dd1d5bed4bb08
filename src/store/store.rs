//! Versioned in-memory document store
//!
//! Holds one version chain per document key, grouped by collection.
//! Every commit is assigned a VersionId by the CommitAuthority and applies
//! atomically: readers either see all writes of a batch or none.
//!
//! Creating or dropping a collection is a layout change. It bumps the
//! layout epoch so attached table views know to recompute from scratch.
//! Both the catalog and the epoch are versioned: a session pinned before a
//! drop keeps reading the dropped collection, and sees the epoch of its own
//! snapshot rather than the latest one.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use super::errors::{StorageError, StorageResult};
use crate::mvcc::{CommitAuthority, ReadView, Version, VersionChain, VersionId, Visibility};

/// Unique identity of a store instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct StoreId(Uuid);

impl StoreId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single write inside a batch
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Put {
        collection: String,
        key: String,
        document: Value,
    },
    Delete {
        collection: String,
        key: String,
    },
}

impl Write {
    fn collection(&self) -> &str {
        match self {
            Write::Put { collection, .. } | Write::Delete { collection, .. } => collection,
        }
    }
}

/// An atomic group of writes committed under one VersionId
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document
    pub fn put(mut self, collection: impl Into<String>, key: impl Into<String>, document: Value) -> Self {
        self.writes.push(Write::Put {
            collection: collection.into(),
            key: key.into(),
            document,
        });
        self
    }

    /// Delete a document (writes a tombstone)
    pub fn delete(mut self, collection: impl Into<String>, key: impl Into<String>) -> Self {
        self.writes.push(Write::Delete {
            collection: collection.into(),
            key: key.into(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// A document visible at some snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Document key
    pub key: String,
    /// Commit that produced the visible version
    pub commit: VersionId,
    /// Document body
    pub document: Value,
}

impl Row {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn document(&self) -> &Value {
        &self.document
    }
}

/// One lifetime of a named collection, from its create to its drop
#[derive(Debug)]
struct Collection {
    created: VersionId,
    dropped: Option<VersionId>,
    chains: BTreeMap<String, VersionChain>,
}

impl Collection {
    fn is_live(&self) -> bool {
        self.dropped.is_none()
    }

    fn visible_at(&self, view: ReadView) -> bool {
        let bound = view.upper_bound();
        self.created <= bound && self.dropped.map_or(true, |dropped| dropped > bound)
    }
}

#[derive(Debug)]
struct StoreState {
    /// Every lifetime of each name, oldest first; only the last can be live
    collections: HashMap<String, Vec<Collection>>,
    authority: CommitAuthority,
    /// Versions of layout changes, ascending
    layout_changes: Vec<VersionId>,
}

impl StoreState {
    fn commit_next(&mut self) -> StorageResult<VersionId> {
        let version = self.authority.next_version();
        self.authority
            .mark_committed(version)
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        Ok(version)
    }

    fn live(&self, name: &str) -> Option<&Collection> {
        self.collections
            .get(name)
            .and_then(|lifetimes| lifetimes.last())
            .filter(|collection| collection.is_live())
    }

    fn live_mut(&mut self, name: &str) -> Option<&mut Collection> {
        self.collections
            .get_mut(name)
            .and_then(|lifetimes| lifetimes.last_mut())
            .filter(|collection| collection.is_live())
    }

    fn at(&self, name: &str, view: ReadView) -> Option<&Collection> {
        self.collections
            .get(name)?
            .iter()
            .rev()
            .find(|collection| collection.visible_at(view))
    }

    fn epoch_at(&self, version: VersionId) -> u64 {
        self.layout_changes.partition_point(|change| *change <= version) as u64
    }
}

/// A versioned, multi-reader document store.
///
/// Always shared through `Arc`; sessions on any thread read from it at
/// their own snapshot.
#[derive(Debug)]
pub struct Store {
    id: StoreId,
    state: RwLock<StoreState>,
}

impl Store {
    /// Create an empty store
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: StoreId::generate(),
            state: RwLock::new(StoreState {
                collections: HashMap::new(),
                authority: CommitAuthority::new(),
                layout_changes: Vec::new(),
            }),
        })
    }

    pub fn id(&self) -> StoreId {
        self.id
    }

    /// The most recent committed version
    pub fn latest_version(&self) -> VersionId {
        self.state.read().authority.latest()
    }

    /// A read view at the most recent committed version
    pub fn current_snapshot(&self) -> ReadView {
        self.state.read().authority.current_snapshot()
    }

    /// Incremented on every incompatible layout change
    pub fn layout_epoch(&self) -> u64 {
        self.state.read().layout_changes.len() as u64
    }

    /// The layout epoch as of `version`
    pub fn layout_epoch_at(&self, version: VersionId) -> u64 {
        self.state.read().epoch_at(version)
    }

    /// Whether `name` exists at the latest version
    pub fn has_collection(&self, name: &str) -> bool {
        self.state.read().live(name).is_some()
    }

    /// Create a collection. Commits a new version.
    pub fn create_collection(&self, name: &str) -> StorageResult<VersionId> {
        let mut state = self.state.write();
        if state.live(name).is_some() {
            return Err(StorageError::CollectionExists(name.to_string()));
        }
        let version = state.authority.next_version();
        state
            .collections
            .entry(name.to_string())
            .or_default()
            .push(Collection {
                created: version,
                dropped: None,
                chains: BTreeMap::new(),
            });
        state.layout_changes.push(version);
        state.commit_next()
    }

    /// Drop a collection. Commits a new version.
    ///
    /// Its history stays readable from snapshots taken before the drop.
    pub fn drop_collection(&self, name: &str) -> StorageResult<VersionId> {
        let mut state = self.state.write();
        let version = state.authority.next_version();
        match state.live_mut(name) {
            Some(collection) => collection.dropped = Some(version),
            None => return Err(StorageError::CollectionNotFound(name.to_string())),
        }
        state.layout_changes.push(version);
        state.commit_next()
    }

    /// Apply a batch atomically under a new VersionId.
    ///
    /// Fails without applying anything if any write targets an unknown
    /// collection.
    pub fn commit(&self, batch: WriteBatch) -> StorageResult<VersionId> {
        let mut state = self.state.write();

        if let Some(missing) = batch
            .writes
            .iter()
            .find(|w| state.live(w.collection()).is_none())
        {
            return Err(StorageError::CollectionNotFound(
                missing.collection().to_string(),
            ));
        }

        let version = state.authority.next_version();
        for write in batch.writes {
            let (collection, key, entry) = match write {
                Write::Put {
                    collection,
                    key,
                    document,
                } => {
                    let entry = Version::with_document(key.clone(), document, version);
                    (collection, key, entry)
                }
                Write::Delete { collection, key } => {
                    let entry = Version::with_tombstone(key.clone(), version);
                    (collection, key, entry)
                }
            };
            let chains = &mut state
                .live_mut(&collection)
                .ok_or_else(|| StorageError::CollectionNotFound(collection.clone()))?
                .chains;
            chains
                .entry(key.clone())
                .or_insert_with(|| VersionChain::new(key))
                .push(entry);
        }

        state.commit_next()
    }

    /// All documents of `collection` visible through `view`, in key order.
    pub fn visible_rows(&self, collection: &str, view: ReadView) -> StorageResult<Vec<Row>> {
        let state = self.state.read();
        let chains = &state
            .at(collection, view)
            .ok_or_else(|| StorageError::CollectionNotFound(collection.to_string()))?
            .chains;

        let rows = chains
            .values()
            .filter_map(|chain| Visibility::visible_version(chain, view))
            .filter_map(|version| {
                version.payload().document().map(|document| Row {
                    key: version.key().to_string(),
                    commit: version.commit(),
                    document: document.clone(),
                })
            })
            .collect();

        Ok(rows)
    }
}
