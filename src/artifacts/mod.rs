//! Data structures and algorithms of the storage engine
//!
//! This module contains the core types and algorithms:
//!
//! - `branch`: Reference names and revision parsing
//! - `checkout`: Working tree migration and conflict detection
//! - `database`: Database entry types
//! - `diff`: Tree diffing and rename detection
//! - `graph`: Commit graph traversal and merge bases
//! - `index`: Index/staging area data structures
//! - `objects`: Object types (blob, tree, commit, tag)
//! - `pack`: Packfile reading and writing
//! - `status`: Working tree status inspection

pub mod branch;
pub mod checkout;
pub mod database;
pub mod diff;
pub mod graph;
pub mod index;
pub mod objects;
pub mod pack;
pub mod status;
