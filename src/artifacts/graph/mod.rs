//! Commit graph traversal
//!
//! Parent links make history a directed acyclic graph; everything here
//! reads that graph without mutating it:
//!
//! - `rev_walk`: lazy history walks in topological or reverse
//!   chronological order
//! - `merge_base`: best common ancestor computation and ancestry checks
//!
//! Both operate on slim commit headers served by the commit cache, so a
//! walk over a long history parses each commit at most once.

pub mod merge_base;
pub mod rev_walk;
