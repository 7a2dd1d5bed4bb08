//! ReadView - Stable snapshot boundary
//!
//! A read view describes which versions a session can see:
//! - Defined by a single scalar: the upper bound VersionId
//! - Never changes once established
//!
//! Advancing a session replaces its read view; it never mutates one.

use super::VersionId;

/// A stable snapshot boundary for reads.
///
/// All versions committed after `upper_bound` are invisible.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ReadView {
    read_upper_bound: VersionId,
}

impl ReadView {
    /// Creates a read view with the given upper bound.
    #[inline]
    pub fn new(upper_bound: VersionId) -> Self {
        Self {
            read_upper_bound: upper_bound,
        }
    }

    /// Returns the highest version visible through this view.
    #[inline]
    pub fn upper_bound(&self) -> VersionId {
        self.read_upper_bound
    }
}
