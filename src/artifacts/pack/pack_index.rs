//! The lookup table that accompanies every pack file.
//!
//! The index is rebuilt from scratch whenever a pack is written and is the
//! only part of the pair that is consulted to decide whether a pack holds an
//! object. Its trailer carries a SHA-1 over the whole index, and the
//! checksum of the sibling pack is embedded so the pair can be matched up
//! after a crash.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, bail, ensure};
use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use derive_new::new;
use sha1::{Digest, Sha1};

use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::RAW_OBJECT_ID_LENGTH;

const INDEX_SIGNATURE: u32 = 0xff74_4f63;
const INDEX_VERSION: u32 = 2;
const FANOUT_SIZE: usize = 256;

/// Where one object lives inside a pack, along with the CRC-32 of its
/// on-disk record.
#[derive(Debug, Clone, new)]
pub struct IndexRecord {
    pub oid: ObjectId,
    pub offset: u32,
    pub crc: u32,
}

/// An in-memory pack index, kept sorted by object id.
#[derive(Debug)]
pub struct PackIndex {
    records: Vec<IndexRecord>,
    pack_checksum: [u8; RAW_OBJECT_ID_LENGTH],
}

impl PackIndex {
    /// Assembles an index over freshly written records. The records may
    /// arrive in pack order; they are sorted here.
    pub fn from_records(
        mut records: Vec<IndexRecord>,
        pack_checksum: [u8; RAW_OBJECT_ID_LENGTH],
    ) -> Self {
        records.sort_by(|left, right| left.oid.as_ref().cmp(right.oid.as_ref()));

        Self {
            records,
            pack_checksum,
        }
    }

    /// Renders the index in its on-disk form, trailer included.
    pub fn serialize(&self) -> Result<Bytes> {
        let mut output = Vec::new();
        output.write_u32::<NetworkEndian>(INDEX_SIGNATURE)?;
        output.write_u32::<NetworkEndian>(INDEX_VERSION)?;

        let mut fanout = [0u32; FANOUT_SIZE];

        for record in &self.records {
            fanout[first_raw_byte(&record.oid)? as usize] += 1;
        }

        for bucket in 1..FANOUT_SIZE {
            fanout[bucket] += fanout[bucket - 1];
        }

        for count in fanout {
            output.write_u32::<NetworkEndian>(count)?;
        }

        for record in &self.records {
            record.oid.write_raw_to(&mut output)?;
        }

        for record in &self.records {
            output.write_u32::<NetworkEndian>(record.crc)?;
        }

        for record in &self.records {
            ensure!(
                record.offset <= i32::MAX as u32,
                "pack offsets beyond 2 GiB are not supported"
            );

            output.write_u32::<NetworkEndian>(record.offset)?;
        }

        output.extend_from_slice(&self.pack_checksum);

        let digest = Sha1::digest(&output);
        output.extend_from_slice(&digest);

        Ok(output.into())
    }

    /// Reads and verifies an index file.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("unable to read the pack index at {:?}", path))?;

        ensure!(
            bytes.len() > 2 * RAW_OBJECT_ID_LENGTH,
            "the pack index at {:?} is truncated",
            path
        );

        let (content, stored_digest) = bytes.split_at(bytes.len() - RAW_OBJECT_ID_LENGTH);

        if Sha1::digest(content).as_slice() != stored_digest {
            bail!("the pack index at {:?} failed its checksum", path);
        }

        Self::deserialize(content)
            .with_context(|| format!("the pack index at {:?} is malformed", path))
    }

    fn deserialize(mut content: &[u8]) -> Result<Self> {
        let reader = &mut content;
        ensure!(
            reader.read_u32::<NetworkEndian>()? == INDEX_SIGNATURE,
            "bad index signature"
        );
        ensure!(
            reader.read_u32::<NetworkEndian>()? == INDEX_VERSION,
            "unsupported index version"
        );

        let mut fanout = [0u32; FANOUT_SIZE];

        for bucket in fanout.iter_mut() {
            *bucket = reader.read_u32::<NetworkEndian>()?;
        }

        let count = fanout[FANOUT_SIZE - 1] as usize;
        let mut oids = Vec::with_capacity(count);

        for _ in 0..count {
            oids.push(ObjectId::read_raw_from(reader)?);
        }

        ensure!(
            oids
                .windows(2)
                .all(|pair| pair[0].as_ref() < pair[1].as_ref()),
            "object ids are not strictly sorted"
        );

        let mut crcs = Vec::with_capacity(count);

        for _ in 0..count {
            crcs.push(reader.read_u32::<NetworkEndian>()?);
        }

        let mut offsets = Vec::with_capacity(count);

        for _ in 0..count {
            let offset = reader.read_u32::<NetworkEndian>()?;
            ensure!(
                offset <= i32::MAX as u32,
                "large pack offsets are not supported"
            );

            offsets.push(offset);
        }

        let mut pack_checksum = [0u8; RAW_OBJECT_ID_LENGTH];
        reader.read_exact(&mut pack_checksum)?;
        ensure!(reader.is_empty(), "trailing bytes after the offset tables");

        let records = oids
            .into_iter()
            .zip(crcs)
            .zip(offsets)
            .map(|((oid, crc), offset)| IndexRecord::new(oid, offset, crc))
            .collect();

        Ok(Self {
            records,
            pack_checksum,
        })
    }

    /// The byte offset of `oid`'s record in the sibling pack.
    pub fn lookup(&self, oid: &ObjectId) -> Option<u64> {
        self.records
            .binary_search_by(|record| record.oid.as_ref().cmp(oid.as_ref()))
            .ok()
            .map(|position| self.records[position].offset as u64)
    }

    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.lookup(oid).is_some()
    }

    pub fn object_ids(&self) -> impl Iterator<Item = &ObjectId> + '_ {
        self.records.iter().map(|record| &record.oid)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn pack_checksum(&self) -> &[u8] {
        &self.pack_checksum
    }
}

fn first_raw_byte(oid: &ObjectId) -> Result<u8> {
    u8::from_str_radix(&oid.as_ref()[..2], 16)
        .with_context(|| format!("object id {} is not hexadecimal", oid))
}

#[cfg(test)]
mod tests {
    use assert_fs::TempDir;
    use assert_fs::prelude::*;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn records() -> Vec<IndexRecord> {
        // Deliberately unsorted and spread across fanout buckets.
        vec![
            IndexRecord::new(oid(0xfe, 3), 300, 30),
            IndexRecord::new(oid(0x00, 1), 12, 10),
            IndexRecord::new(oid(0x01, 2), 150, 20),
            IndexRecord::new(oid(0x01, 1), 90, 40),
        ]
    }

    fn oid(bucket: u8, tail: u8) -> ObjectId {
        let mut raw = [tail; RAW_OBJECT_ID_LENGTH];
        raw[0] = bucket;

        ObjectId::from_raw_bytes(&raw).unwrap()
    }

    #[rstest]
    fn a_written_index_can_be_read_back(records: Vec<IndexRecord>) {
        let temp = TempDir::new().unwrap();
        let file = temp.child("pack-test.idx");
        let index = PackIndex::from_records(records.clone(), [7u8; RAW_OBJECT_ID_LENGTH]);
        file.write_binary(&index.serialize().unwrap()).unwrap();

        let loaded = PackIndex::load(file.path()).unwrap();

        assert_eq!(loaded.len(), records.len());
        assert_eq!(loaded.pack_checksum(), [7u8; RAW_OBJECT_ID_LENGTH]);

        for record in &records {
            assert_eq!(loaded.lookup(&record.oid), Some(record.offset as u64));
        }

        assert_eq!(loaded.lookup(&oid(0xab, 0xcd)), None);
    }

    #[rstest]
    fn object_ids_come_back_sorted(records: Vec<IndexRecord>) {
        let index = PackIndex::from_records(records, [0u8; RAW_OBJECT_ID_LENGTH]);

        let ids: Vec<_> = index.object_ids().map(ObjectId::to_string).collect();
        let mut sorted = ids.clone();
        sorted.sort();

        assert_eq!(ids, sorted);
    }

    #[rstest]
    fn a_flipped_byte_fails_the_checksum(records: Vec<IndexRecord>) {
        let temp = TempDir::new().unwrap();
        let file = temp.child("pack-test.idx");
        let index = PackIndex::from_records(records, [0u8; RAW_OBJECT_ID_LENGTH]);

        let mut bytes = index.serialize().unwrap().to_vec();
        bytes[40] ^= 0xff;
        file.write_binary(&bytes).unwrap();

        let error = PackIndex::load(file.path()).unwrap_err();

        assert!(error.to_string().contains("checksum"));
    }
}
