//! Stored object model
//!
//! Everything the engine persists is one of four immutable object kinds,
//! identified by the SHA-1 of its framed content:
//!
//! - **Blob**: raw file bytes
//! - **Tree**: directory listing (mode, name, child id)
//! - **Commit**: snapshot metadata plus parent links forming the DAG
//! - **Tag**: annotated pointer to another object
//!
//! All kinds share the outer framing `<kind> <size>\0<content>`; the
//! framed bytes are what gets hashed and what the loose store compresses.

pub mod blob;
pub mod commit;
pub mod object;
pub mod object_id;
pub mod object_type;
pub mod tag;
pub mod tree;

/// Length of an object id in hexadecimal form
pub const OBJECT_ID_LENGTH: usize = 40;

/// Length of an object id in binary form
pub const RAW_OBJECT_ID_LENGTH: usize = OBJECT_ID_LENGTH / 2;
