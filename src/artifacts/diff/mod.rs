//! Tree diffing
//!
//! - `tree_diff`: recursive comparison of two trees into a path-keyed
//!   change set
//! - `rename`: post-pass that folds similar delete/add pairs into
//!   rename records
//!
//! The change set is the common currency here: checkout migrations
//! consume it raw, while the diff operation runs rename detection over
//! it first.

pub mod rename;
pub mod tree_diff;
