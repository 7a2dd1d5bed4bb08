//! MVCC Visibility - Snapshot isolation for a single key
//!
//! Given a read view `R` and a version chain for key `K`, the visible
//! version is:
//! 1. Among versions with `commit <= R.upper_bound`
//! 2. The one with the largest commit
//! 3. Unless it is a tombstone, in which case `K` is invisible

use super::{ReadView, Version, VersionChain};

/// Stateless visibility resolver.
pub struct Visibility;

impl Visibility {
    /// Returns the version of `chain` visible through `view`, if any.
    pub fn visible_version(chain: &VersionChain, view: ReadView) -> Option<&Version> {
        let upper_bound = view.upper_bound();

        // Chains are in commit order, so the last version within the bound wins
        let visible = chain
            .versions()
            .iter()
            .rev()
            .find(|v| v.commit() <= upper_bound)?;

        if visible.is_tombstone() {
            None
        } else {
            Some(visible)
        }
    }
}
