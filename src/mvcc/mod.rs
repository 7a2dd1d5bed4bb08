//! MVCC Domain Types
//!
//! Snapshot vocabulary shared by the store and the handover protocol:
//! - `VersionId` - Totally ordered snapshot handle
//! - `ReadView` - Stable snapshot boundary
//! - `Version` / `VersionChain` - Immutable document history
//! - `Visibility` - Snapshot isolation for a key
//! - `CommitAuthority` - VersionId assignment

mod commit_authority;
mod read_view;
mod version;
mod version_chain;
mod version_id;
mod visibility;

pub use commit_authority::{CommitAuthority, CommitAuthorityError};
pub use read_view::ReadView;
pub use version::{Version, VersionPayload};
pub use version_chain::VersionChain;
pub use version_id::VersionId;
pub use visibility::Visibility;
