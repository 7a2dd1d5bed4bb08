//! VersionId - Totally ordered snapshot handle
//!
//! Every commit to a store produces exactly one VersionId:
//! - Totally orders all committed states
//! - Independent of wall-clock time
//! - No two commits share an identity
//!
//! Sessions, read views and handover envelopes are all tagged with one.

use std::fmt;

/// A totally ordered identity for one committed state of a store.
///
/// Comparing two handles answers "which snapshot is more recent". Staleness
/// checks throughout the handover protocol are plain `<` / `!=` comparisons
/// on this type.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VersionId(u64);

impl VersionId {
    /// The version of a store before its first commit.
    pub const INITIAL: VersionId = VersionId(0);

    /// Creates a new VersionId with the given value.
    #[inline]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying value.
    ///
    /// Exists for logging and debugging only.
    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Returns the version immediately after this one.
    #[inline]
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}
