//! Pack construction.
//!
//! The writer loads every requested object, groups candidates by kind with
//! the largest first, and tries to express each one as a delta against a
//! recently packed object of the same kind and a similar size. A delta is
//! only kept when its wire form is less than half the size of the full
//! content, so packing a set of unrelated objects degrades to storing them
//! whole rather than to pathological chains.
//!
//! Both halves of the pair are staged under temporary names and renamed
//! into place, pack first and index last. Readers discover packs by their
//! index file, so a crash between the two renames leaves nothing visible.

use std::collections::{HashSet, VecDeque};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use byteorder::{NetworkEndian, WriteBytesExt};
use bytes::Bytes;
use fake::rand;
use flate2::write::ZlibEncoder;
use flate2::{Compression, Crc};
use sha1::{Digest, Sha1};
use tracing::{debug, info};

use super::delta::Delta;
use super::pack_index::{IndexRecord, PackIndex};
use super::{
    DELTA_WINDOW, MAX_DELTA_CHAIN, PACK_SIGNATURE, PACK_VERSION, RecordKind, write_record_header,
};
use crate::areas::database::Database;
use crate::artifacts::objects::RAW_OBJECT_ID_LENGTH;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;

/// Where a finished pack landed and how much of it was delta-compressed.
#[derive(Debug)]
pub struct PackFile {
    pub pack_path: PathBuf,
    pub index_path: PathBuf,
    pub checksum: String,
    pub record_count: usize,
    pub delta_count: usize,
}

pub struct PackWriter<'a> {
    database: &'a Database,
}

struct Candidate {
    oid: ObjectId,
    object_type: ObjectType,
    content: Bytes,
}

enum Payload {
    Full(Bytes),
    Delta { base: ObjectId, bytes: Bytes },
}

struct PlannedRecord {
    oid: ObjectId,
    object_type: ObjectType,
    payload: Payload,
}

struct WindowEntry {
    oid: ObjectId,
    object_type: ObjectType,
    content: Bytes,
    depth: usize,
}

impl<'a> PackWriter<'a> {
    pub fn new(database: &'a Database) -> Self {
        PackWriter { database }
    }

    /// Packs the given objects into a fresh pair under `pack_dir` and
    /// publishes it atomically. Duplicate ids are packed once.
    pub fn write(&self, object_ids: &[ObjectId], pack_dir: &Path) -> Result<PackFile> {
        let candidates = self.load_candidates(object_ids)?;
        ensure!(!candidates.is_empty(), "refusing to write an empty pack");

        std::fs::create_dir_all(pack_dir).context(format!(
            "Unable to create pack directory {}",
            pack_dir.display()
        ))?;

        let records = plan_records(candidates);
        let delta_count = records
            .iter()
            .filter(|record| matches!(record.payload, Payload::Delta { .. }))
            .count();

        let temp_pack_path = pack_dir.join(format!("tmp-pack-{}", rand::random::<u32>()));
        let file = std::fs::File::create(&temp_pack_path).context(format!(
            "Unable to create pack file {}",
            temp_pack_path.display()
        ))?;
        let mut writer = HashingWriter::new(BufWriter::new(file));

        writer.write_all(PACK_SIGNATURE)?;
        writer.write_u32::<NetworkEndian>(PACK_VERSION)?;
        writer.write_u32::<NetworkEndian>(records.len() as u32)?;

        let mut index_records = Vec::with_capacity(records.len());

        for record in &records {
            let offset = u32::try_from(writer.written)
                .ok()
                .filter(|offset| *offset <= i32::MAX as u32)
                .context("the pack exceeds the supported size")?;

            let record_bytes = serialize_record(record)?;
            let mut crc = Crc::new();
            crc.update(&record_bytes);

            writer.write_all(&record_bytes)?;
            index_records.push(IndexRecord::new(record.oid.clone(), offset, crc.sum()));
        }

        let (mut file_writer, digest) = writer.finish();
        file_writer.write_all(&digest)?;
        file_writer.flush()?;
        drop(file_writer);

        let checksum: String = digest.iter().map(|byte| format!("{:02x}", byte)).collect();
        let index = PackIndex::from_records(index_records, digest);
        let temp_index_path = pack_dir.join(format!("tmp-idx-{}", rand::random::<u32>()));
        std::fs::write(&temp_index_path, index.serialize()?).context(format!(
            "Unable to write pack index {}",
            temp_index_path.display()
        ))?;

        let pack_path = pack_dir.join(format!("pack-{}.pack", checksum));
        let index_path = pack_dir.join(format!("pack-{}.idx", checksum));

        // The index is renamed last: readers treat its appearance as the
        // publication point of the whole pair.
        std::fs::rename(&temp_pack_path, &pack_path).context(format!(
            "Unable to rename pack file to {}",
            pack_path.display()
        ))?;
        std::fs::rename(&temp_index_path, &index_path).context(format!(
            "Unable to rename pack index to {}",
            index_path.display()
        ))?;

        info!(
            pack = %pack_path.display(),
            records = records.len(),
            deltas = delta_count,
            "published a pack"
        );

        Ok(PackFile {
            pack_path,
            index_path,
            checksum,
            record_count: records.len(),
            delta_count,
        })
    }

    fn load_candidates(&self, object_ids: &[ObjectId]) -> Result<Vec<Candidate>> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::with_capacity(object_ids.len());

        for oid in object_ids {
            if !seen.insert(oid.clone()) {
                continue;
            }

            let (object_type, content) = self.database.load(oid)?;
            candidates.push(Candidate {
                oid: oid.clone(),
                object_type,
                content,
            });
        }

        // Group by kind with the largest first, so deltas point backwards
        // at larger bases.
        candidates.sort_by(|left, right| {
            left.object_type
                .as_pack_id()
                .cmp(&right.object_type.as_pack_id())
                .then_with(|| right.content.len().cmp(&left.content.len()))
                .then_with(|| left.oid.cmp(&right.oid))
        });

        Ok(candidates)
    }
}

fn plan_records(candidates: Vec<Candidate>) -> Vec<PlannedRecord> {
    let mut records = Vec::with_capacity(candidates.len());
    let mut window: VecDeque<WindowEntry> = VecDeque::with_capacity(DELTA_WINDOW + 1);

    for candidate in candidates {
        let (payload, depth) = best_payload(&window, &candidate);

        window.push_front(WindowEntry {
            oid: candidate.oid.clone(),
            object_type: candidate.object_type,
            content: candidate.content,
            depth,
        });

        if window.len() > DELTA_WINDOW {
            window.pop_back();
        }

        records.push(PlannedRecord {
            oid: candidate.oid,
            object_type: candidate.object_type,
            payload,
        });
    }

    records
}

/// Picks the cheapest acceptable form for one candidate: a delta against
/// the windowed object closest in size, or the full content when nothing
/// similar enough is in reach.
fn best_payload(window: &VecDeque<WindowEntry>, candidate: &Candidate) -> (Payload, usize) {
    let mut bases: Vec<&WindowEntry> = window
        .iter()
        .filter(|entry| {
            entry.object_type == candidate.object_type && entry.depth < MAX_DELTA_CHAIN
        })
        .collect();
    bases.sort_by_key(|entry| entry.content.len().abs_diff(candidate.content.len()));

    for base in bases {
        let delta = Delta::compute(&base.content, &candidate.content);
        let bytes = delta.serialize();

        if bytes.len() * 2 < candidate.content.len() {
            debug!(
                oid = %candidate.oid,
                base = %base.oid,
                delta_len = bytes.len(),
                "delta-compressed a record"
            );

            return (
                Payload::Delta {
                    base: base.oid.clone(),
                    bytes,
                },
                base.depth + 1,
            );
        }
    }

    (Payload::Full(candidate.content.clone()), 0)
}

fn serialize_record(record: &PlannedRecord) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();

    match &record.payload {
        Payload::Full(content) => {
            write_record_header(
                &mut bytes,
                &RecordKind::Full(record.object_type),
                content.len() as u64,
            )?;

            deflate_into(bytes, content)
        }
        Payload::Delta { base, bytes: delta } => {
            write_record_header(&mut bytes, &RecordKind::RefDelta, delta.len() as u64)?;
            base.write_raw_to(&mut bytes)?;

            deflate_into(bytes, delta)
        }
    }
}

fn deflate_into(bytes: Vec<u8>, payload: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(bytes, Compression::default());
    encoder
        .write_all(payload)
        .context("Unable to compress a pack record")?;

    encoder
        .finish()
        .context("Unable to finish compressing a pack record")
}

/// A write wrapper that folds everything passing through it into a SHA-1,
/// feeding the trailing checksum of the pack.
struct HashingWriter<W: Write> {
    inner: W,
    digest: Sha1,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        HashingWriter {
            inner,
            digest: Sha1::new(),
            written: 0,
        }
    }

    fn finish(self) -> (W, [u8; RAW_OBJECT_ID_LENGTH]) {
        (self.inner, self.digest.finalize().into())
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.digest.update(&buf[..written]);
        self.written += written as u64;

        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
