//! Repository operations
//!
//! Each file extends [`crate::areas::repository::Repository`] with one
//! operation, following the same flow: lock and rehydrate the index
//! when the operation touches it, act through the storage areas, then
//! persist whatever changed.
//!
//! - `init`: lay out a fresh repository directory
//! - `add` / `remove`: move paths in and out of the staging index
//! - `commit`: turn the index into trees plus a commit and advance HEAD
//! - `status`: tracked-path lifecycle read-out
//! - `checkout`: switch the worktree to another commit's tree
//! - `branch` / `tag`: reference bookkeeping
//! - `history`: graph walks, merge bases, ancestry checks
//! - `diff`: tree-to-tree change sets with rename detection
//! - `repack`: fold loose objects into a pack

pub mod add;
pub mod branch;
pub mod checkout;
pub mod commit;
pub mod diff;
pub mod history;
pub mod init;
pub mod remove;
pub mod repack;
pub mod status;
pub mod tag;
