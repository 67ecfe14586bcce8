//! Staging index file format
//!
//! The index maps tracked paths to (object id, stat metadata) and is the
//! source the next commit's trees are built from. It lives between
//! commits and is rewritten atomically under an exclusive lock.
//!
//! ## File format (version 2)
//!
//! ```text
//! Header (12 bytes):
//!   - Signature: "DIRC" (4 bytes)
//!   - Version: 2 (4 bytes)
//!   - Entry count (4 bytes)
//!
//! Entries (variable length):
//!   - Stat metadata, object id, flags, NUL-terminated path
//!   - Each entry padded with NULs to 8-byte alignment
//!
//! Checksum (20 bytes):
//!   - SHA-1 over all preceding bytes
//! ```

pub mod checksum;
pub mod entry_mode;
pub mod index_entry;
pub mod index_header;

/// Size of a SHA-1 checksum trailer in bytes
pub const CHECKSUM_SIZE: usize = 20;

/// Size of the index header: 4-byte marker, version, entry count
pub const HEADER_SIZE: usize = 12;

/// Magic signature identifying index files
pub const SIGNATURE: &str = "DIRC";

/// Index file format version
pub const VERSION: u32 = 2;
