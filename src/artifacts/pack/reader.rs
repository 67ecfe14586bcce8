//! Random access reads out of a pack file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::{Context, Result, bail, ensure};
use byteorder::{NetworkEndian, ReadBytesExt};
use bytes::Bytes;
use flate2::read::ZlibDecoder;
use sha1::{Digest, Sha1};

use super::pack_index::PackIndex;
use super::{MAX_RESOLVE_CHAIN, PACK_SIGNATURE, PACK_VERSION, RecordKind, read_record_header};
use crate::artifacts::objects::RAW_OBJECT_ID_LENGTH;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::RepositoryError;

/// A pack file paired with its loaded index.
#[derive(Debug)]
pub struct PackReader {
    pack_path: Box<Path>,
    index: PackIndex,
}

enum RawRecord {
    Full(ObjectType, Bytes),
    RefDelta { base: ObjectId, delta: Bytes },
}

impl PackReader {
    /// Opens the pack at `pack_path`, loading the index file next to it.
    pub fn open(pack_path: &Path) -> Result<Self> {
        let index = PackIndex::load(&pack_path.with_extension("idx"))?;

        Ok(Self {
            pack_path: pack_path.into(),
            index,
        })
    }

    pub fn pack_path(&self) -> &Path {
        &self.pack_path
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.index.contains(oid)
    }

    /// Reconstructs an object's kind and content, resolving any delta chain
    /// it sits on and rehashing the result against the requested id.
    pub fn read_object(&self, oid: &ObjectId) -> Result<(ObjectType, Bytes)> {
        let offset = self
            .index
            .lookup(oid)
            .ok_or_else(|| RepositoryError::NotFound(oid.to_string()))?;

        let mut file = File::open(&self.pack_path)
            .with_context(|| format!("unable to open the pack at {:?}", self.pack_path))?;
        let (object_type, content) = self.resolve(&mut file, offset, 0, oid)?;

        let mut hasher = Sha1::new();
        hasher.update(format!("{} {}\0", object_type, content.len()).as_bytes());
        hasher.update(&content);
        let actual = format!("{:x}", hasher.finalize());

        if actual != oid.as_ref() {
            return Err(RepositoryError::CorruptObject {
                oid: oid.clone(),
                reason: format!("packed content hashes to {}", actual),
            }
            .into());
        }

        Ok((object_type, content))
    }

    fn resolve(
        &self,
        file: &mut File,
        offset: u64,
        depth: usize,
        requested: &ObjectId,
    ) -> Result<(ObjectType, Bytes)> {
        if depth > MAX_RESOLVE_CHAIN {
            return Err(RepositoryError::CorruptObject {
                oid: requested.clone(),
                reason: format!("delta chain exceeds {} records", MAX_RESOLVE_CHAIN),
            }
            .into());
        }

        match self.record_at(file, offset)? {
            RawRecord::Full(object_type, content) => Ok((object_type, content)),
            RawRecord::RefDelta { base, delta } => {
                let base_offset = self.index.lookup(&base).ok_or_else(|| {
                    RepositoryError::CorruptObject {
                        oid: requested.clone(),
                        reason: format!("delta base {} is missing from the pack", base),
                    }
                })?;

                let (object_type, base_content) =
                    self.resolve(file, base_offset, depth + 1, requested)?;
                let delta = super::delta::Delta::deserialize(&delta)
                    .with_context(|| format!("record at offset {} holds a bad delta", offset))?;
                let content = delta.apply(&base_content)?;

                Ok((object_type, content))
            }
        }
    }

    fn record_at(&self, file: &mut File, offset: u64) -> Result<RawRecord> {
        file.seek(SeekFrom::Start(offset))?;
        let (kind, size) = read_record_header(file)
            .with_context(|| format!("bad record header at offset {}", offset))?;

        match kind {
            RecordKind::Full(object_type) => {
                Ok(RawRecord::Full(object_type, inflate(file, size)?))
            }
            RecordKind::RefDelta => {
                let base = ObjectId::read_raw_from(file)?;
                let delta = inflate(file, size)?;

                Ok(RawRecord::RefDelta { base, delta })
            }
        }
    }

    /// Checks the pack trailer against the file contents and against the
    /// checksum recorded in the index.
    pub fn verify(&self) -> Result<()> {
        let bytes = std::fs::read(&self.pack_path)
            .with_context(|| format!("unable to read the pack at {:?}", self.pack_path))?;

        ensure!(
            bytes.len() > 12 + RAW_OBJECT_ID_LENGTH,
            "the pack at {:?} is truncated",
            self.pack_path
        );

        let (content, stored_digest) = bytes.split_at(bytes.len() - RAW_OBJECT_ID_LENGTH);

        if Sha1::digest(content).as_slice() != stored_digest {
            bail!("the pack at {:?} failed its checksum", self.pack_path);
        }

        if stored_digest != self.index.pack_checksum() {
            bail!(
                "the pack at {:?} does not match the checksum in its index",
                self.pack_path
            );
        }

        let mut header = content;
        let reader = &mut header;
        let mut signature = [0u8; 4];
        reader.read_exact(&mut signature)?;
        ensure!(&signature == PACK_SIGNATURE, "bad pack signature");
        ensure!(
            reader.read_u32::<NetworkEndian>()? == PACK_VERSION,
            "unsupported pack version"
        );
        ensure!(
            reader.read_u32::<NetworkEndian>()? as usize == self.index.len(),
            "the pack and its index disagree on the object count"
        );

        Ok(())
    }
}

fn inflate(file: &mut File, expected: u64) -> Result<Bytes> {
    let mut payload = Vec::with_capacity(expected as usize);
    ZlibDecoder::new(file.by_ref())
        .read_to_end(&mut payload)
        .context("unable to inflate a pack record")?;

    ensure!(
        payload.len() as u64 == expected,
        "a pack record inflated to {} bytes but declared {}",
        payload.len(),
        expected
    );

    Ok(payload.into())
}
