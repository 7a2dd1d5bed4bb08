//! Commit Authority - VersionId assignment
//!
//! - Every commit receives exactly one VersionId
//! - Assigned identities are strictly increasing
//! - The authority only tracks the highest committed identity

use super::{ReadView, VersionId};

/// Assigns VersionIds to commits of a single store.
#[derive(Debug)]
pub struct CommitAuthority {
    highest: VersionId,
}

impl CommitAuthority {
    /// Creates an authority for an empty store.
    pub fn new() -> Self {
        Self {
            highest: VersionId::INITIAL,
        }
    }

    /// Returns the identity the next commit will receive.
    pub fn next_version(&self) -> VersionId {
        self.highest.next()
    }

    /// Records `version` as committed.
    ///
    /// Only the identity returned by `next_version` is accepted.
    pub fn mark_committed(&mut self, version: VersionId) -> Result<(), CommitAuthorityError> {
        let expected = self.highest.next();
        if version != expected {
            return Err(CommitAuthorityError::OutOfOrder {
                attempted: version.value(),
                expected: expected.value(),
            });
        }
        self.highest = version;
        Ok(())
    }

    /// Returns the most recent committed version.
    pub fn latest(&self) -> VersionId {
        self.highest
    }

    /// Returns a read view at the most recent commit.
    pub fn current_snapshot(&self) -> ReadView {
        ReadView::new(self.highest)
    }
}

impl Default for CommitAuthority {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors from commit authority operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommitAuthorityError {
    #[error("Out of order commit: attempted {attempted} but expected {expected}")]
    OutOfOrder { attempted: u64, expected: u64 },
}
