//! Packfile support.
//!
//! A pack is a single append-only file that stores many objects, each either
//! as a full zlib-compressed payload or as a delta against an earlier object
//! in the same pack. Every pack is accompanied by an index file that maps
//! object ids to byte offsets, so a packed object can be read without
//! scanning the whole pack.
//!
//! ## Layout
//!
//! - `pack-<checksum>.pack` starts with a 12 byte header (`PACK`, version,
//!   object count), followed by one record per object and a trailing SHA-1
//!   over everything before it.
//! - `pack-<checksum>.idx` holds a 256-way fanout table, the sorted object
//!   ids, per-record CRC-32 checksums and the record offsets.
//!
//! Records that reuse another object's bytes carry the full 20 byte id of
//! their base, so a pack together with its index is self-describing.

pub mod delta;
pub mod pack_index;
pub mod reader;
pub mod writer;

use std::io::{self, Read, Write};

use anyhow::{Result, bail};

use crate::artifacts::objects::object_type::ObjectType;

/// Magic bytes at the start of every pack file.
pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";

/// The only pack format version this crate reads or writes.
pub const PACK_VERSION: u32 = 2;

/// Record tag for a delta whose base is named by a full object id.
pub const REF_DELTA_ID: u8 = 7;

/// Longest delta chain the writer will produce.
pub const MAX_DELTA_CHAIN: usize = 10;

/// Hard ceiling on chain length when resolving records, so a corrupt pack
/// cannot send the reader on an unbounded walk.
pub const MAX_RESOLVE_CHAIN: usize = 32;

/// How many recently packed objects of the same kind are considered as
/// delta bases for the next object.
pub const DELTA_WINDOW: usize = 10;

/// The payload form of a single pack record.
pub enum RecordKind {
    Full(ObjectType),
    RefDelta,
}

impl RecordKind {
    pub fn as_record_id(&self) -> u8 {
        match self {
            RecordKind::Full(object_type) => object_type.as_pack_id(),
            RecordKind::RefDelta => REF_DELTA_ID,
        }
    }

    pub fn from_record_id(id: u8) -> Result<Self> {
        if id == REF_DELTA_ID {
            return Ok(RecordKind::RefDelta);
        }

        Ok(RecordKind::Full(ObjectType::from_pack_id(id)?))
    }
}

/// Writes a record header: the record kind in the upper bits of the first
/// byte and the inflated payload size as a little endian varint spread over
/// the remaining bits.
pub(crate) fn write_record_header(
    writer: &mut impl Write,
    kind: &RecordKind,
    size: u64,
) -> io::Result<()> {
    let mut size = size;
    let mut byte = (kind.as_record_id() << 4) | (size & 0x0f) as u8;
    size >>= 4;

    while size > 0 {
        writer.write_all(&[byte | 0x80])?;
        byte = (size & 0x7f) as u8;
        size >>= 7;
    }

    writer.write_all(&[byte])
}

/// Reads back a header produced by [`write_record_header`].
pub(crate) fn read_record_header(reader: &mut impl Read) -> Result<(RecordKind, u64)> {
    let mut byte = read_byte(reader)?;
    let kind = RecordKind::from_record_id((byte >> 4) & 0x07)?;
    let mut size = (byte & 0x0f) as u64;
    let mut shift = 4;

    while byte & 0x80 != 0 {
        if shift > 60 {
            bail!("pack record size varint is too long");
        }

        byte = read_byte(reader)?;
        size |= ((byte & 0x7f) as u64) << shift;
        shift += 7;
    }

    Ok((kind, size))
}

pub(crate) fn read_byte(reader: &mut impl Read) -> io::Result<u8> {
    let mut buffer = [0u8; 1];
    reader.read_exact(&mut buffer)?;

    Ok(buffer[0])
}
