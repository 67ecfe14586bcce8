//! # Errors
//!
//! Structured failure taxonomy for the storage engine. Fallible paths
//! return `anyhow::Result`; when a failure is one a caller can react to
//! programmatically (a lost reference race, a blocked checkout, a hash
//! mismatch) the chain carries a [`RepositoryError`] that can be
//! recovered with `downcast_ref`.

use std::fmt;
use std::path::PathBuf;

use crate::artifacts::objects::object_id::ObjectId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// An object or reference that was asked for does not exist.
    NotFound(String),
    /// Stored or reconstructed bytes do not rehash to the requested id.
    CorruptObject { oid: ObjectId, reason: String },
    /// A compare-and-swap reference update observed a different current
    /// value than the caller expected.
    Conflict {
        name: String,
        expected: Option<ObjectId>,
        actual: Option<ObjectId>,
    },
    /// A symbolic reference chain ended at a target that does not exist.
    DanglingReference { name: String, target: String },
    /// A symbolic reference chain revisited a name or exceeded the
    /// indirection depth bound.
    ReferenceCycle { name: String },
    /// Local workspace changes block a checkout migration.
    NeedsMerge { conflicts: Vec<PathBuf> },
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryError::NotFound(what) => write!(f, "{} not found", what),
            RepositoryError::CorruptObject { oid, reason } => {
                write!(f, "object {} is corrupt: {}", oid, reason)
            }
            RepositoryError::Conflict {
                name,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "reference {} changed concurrently (expected {}, found {})",
                    name,
                    display_oid(expected),
                    display_oid(actual)
                )
            }
            RepositoryError::DanglingReference { name, target } => {
                write!(f, "reference {} points at missing target {}", name, target)
            }
            RepositoryError::ReferenceCycle { name } => {
                write!(f, "symbolic reference cycle through {}", name)
            }
            RepositoryError::NeedsMerge { conflicts } => {
                writeln!(f, "local changes block checkout:")?;
                for path in conflicts {
                    writeln!(f, "\t{}", path.display())?;
                }
                write!(f, "commit or discard them before switching trees")
            }
        }
    }
}

impl std::error::Error for RepositoryError {}

fn display_oid(oid: &Option<ObjectId>) -> String {
    match oid {
        Some(oid) => oid.to_string(),
        None => "nothing".to_string(),
    }
}

/// Fishes the structured taxonomy out of an `anyhow` chain, if present.
pub fn as_repository_error(err: &anyhow::Error) -> Option<&RepositoryError> {
    err.downcast_ref::<RepositoryError>()
}
