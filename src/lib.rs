//! A Git-compatible object and repository storage engine.
//!
//! The crate is organized around a [`Repository`] handle that owns four
//! storage areas and exposes the operations as methods:
//!
//! - [`areas`]: the object database, the staging index, the reference
//!   store, and the worktree
//! - [`artifacts`]: the data structures and algorithms those areas are
//!   built from (object kinds, index plumbing, pack format, graph
//!   walks, tree diffing, checkout migration)
//! - [`operations`]: one file per operation, each an `impl Repository`
//!   block
//! - [`errors`]: the structured failure taxonomy carried through
//!   `anyhow` chains
//!
//! ```no_run
//! use silt::Repository;
//! use silt::artifacts::objects::commit::Author;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let repo = Repository::new("/tmp/project")?;
//! repo.init().await?;
//! repo.add(&["src/main.rs".into()]).await?;
//! let author = Author::new("Ada".into(), "ada@example.com".into());
//! repo.commit(author, "first").await?;
//! # Ok(())
//! # }
//! ```

pub mod areas;
pub mod artifacts;
pub mod errors;
pub mod operations;

pub use areas::repository::Repository;
pub use artifacts::diff::tree_diff::{ChangeSet, TreeChangeType};
pub use artifacts::graph::rev_walk::WalkOrder;
pub use artifacts::objects::commit::{Author, Commit};
pub use artifacts::objects::object_id::ObjectId;
pub use artifacts::pack::writer::PackFile;
pub use artifacts::status::file_change::PathState;
pub use errors::{RepositoryError, as_repository_error};
