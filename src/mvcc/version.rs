//! Version - Immutable document version
//!
//! - A version is a complete JSON document OR an explicit tombstone
//! - Has the VersionId of the commit that produced it
//! - Once created, never changes

use serde_json::Value;

use super::VersionId;

/// The payload of a version: either a document or an explicit tombstone.
#[derive(Clone, Debug, PartialEq)]
pub enum VersionPayload {
    /// A complete document body.
    Document(Value),
    /// An explicit deletion marker.
    Tombstone,
}

impl VersionPayload {
    /// Returns true if this payload is a tombstone.
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        matches!(self, VersionPayload::Tombstone)
    }

    /// Returns the document body, if any.
    #[inline]
    pub fn document(&self) -> Option<&Value> {
        match self {
            VersionPayload::Document(doc) => Some(doc),
            VersionPayload::Tombstone => None,
        }
    }
}

/// A single immutable document version.
#[derive(Clone, Debug, PartialEq)]
pub struct Version {
    key: String,
    payload: VersionPayload,
    commit: VersionId,
}

impl Version {
    /// Creates a version holding a document body.
    pub fn with_document(key: impl Into<String>, document: Value, commit: VersionId) -> Self {
        Self {
            key: key.into(),
            payload: VersionPayload::Document(document),
            commit,
        }
    }

    /// Creates a tombstone version.
    pub fn with_tombstone(key: impl Into<String>, commit: VersionId) -> Self {
        Self {
            key: key.into(),
            payload: VersionPayload::Tombstone,
            commit,
        }
    }

    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[inline]
    pub fn payload(&self) -> &VersionPayload {
        &self.payload
    }

    /// Returns the commit that produced this version.
    #[inline]
    pub fn commit(&self) -> VersionId {
        self.commit
    }

    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.payload.is_tombstone()
    }
}
