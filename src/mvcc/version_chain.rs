//! VersionChain - Version history for one document key
//!
//! Versions are appended in commit order. The chain holds data only;
//! visibility is decided by `Visibility`.

use super::Version;

/// The complete version history of a single document key.
#[derive(Clone, Debug)]
pub struct VersionChain {
    key: String,
    versions: Vec<Version>,
}

impl VersionChain {
    /// Creates a new empty chain for the given key.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            versions: Vec::new(),
        }
    }

    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Appends a version. Callers append in commit order.
    pub fn push(&mut self, version: Version) {
        debug_assert!(
            self.versions
                .last()
                .map_or(true, |last| last.commit() < version.commit()),
            "versions must be appended in commit order"
        );
        self.versions.push(version);
    }

    /// Returns all versions in commit order.
    #[inline]
    pub fn versions(&self) -> &[Version] {
        &self.versions
    }
}
