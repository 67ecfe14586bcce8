//! Tree checkout
//!
//! Switching the worktree to another tree means diffing current against
//! target, planning the filesystem actions, refusing the whole plan if
//! any action would lose local state, and otherwise applying it to the
//! worktree and the index together.
//!
//! - `migration`: the two-phase plan/apply machinery
//! - `conflict`: classification of blocked paths

pub mod conflict;
pub mod migration;
