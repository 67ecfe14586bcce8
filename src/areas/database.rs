//! Content-addressed object storage.
//!
//! Objects live in two tiers under `.git/objects`: a loose tier with one
//! zlib-compressed file per object, fanned out over 256 directories by the
//! first two id characters, and a packed tier of pack/index pairs under
//! `pack/`. Reads consult the loose tier first and fall through to the
//! packs, so packing never changes what a caller observes.
//!
//! Every read rehashes what came off disk against the requested id and
//! reports a mismatch as [`RepositoryError::CorruptObject`]. Loose writes go
//! through a temporary file in the same directory followed by a rename, so
//! a concurrent reader sees either nothing or the complete object.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{BufRead, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use bytes::Bytes;
use fake::rand;
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::artifacts::diff::tree_diff::TreeDiff;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::{Commit, SlimCommit};
use crate::artifacts::objects::object::{Object, ObjectBox, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tag::Tag;
use crate::artifacts::objects::tree::Tree;
use crate::artifacts::pack::reader::PackReader;
use crate::errors::RepositoryError;

#[derive(Debug)]
pub struct Database {
    path: Box<Path>,
    packs: RefCell<Vec<PackReader>>,
}

impl Database {
    pub fn new(path: Box<Path>) -> Self {
        Database {
            path,
            packs: RefCell::new(Vec::new()),
        }
    }

    pub fn objects_path(&self) -> &Path {
        &self.path
    }

    pub fn pack_path(&self) -> PathBuf {
        self.path.join("pack")
    }

    pub fn tree_diff(
        &self,
        old_oid: Option<&ObjectId>,
        new_oid: Option<&ObjectId>,
    ) -> anyhow::Result<TreeDiff<'_>> {
        let mut tree_diff = TreeDiff::new(self);
        tree_diff.compare_oids(old_oid, new_oid)?;
        Ok(tree_diff)
    }

    /// Stores a typed object, returning the id its serialized form hashes
    /// to. Storing an object that already exists is a no-op.
    pub fn store(&self, object: &impl Object) -> anyhow::Result<ObjectId> {
        let framed = object.serialize()?;
        let oid = hash_framed(&framed)?;

        self.write_if_absent(&oid, framed)?;

        Ok(oid)
    }

    /// Stores raw content under the given kind, framing and hashing it
    /// here. This is the write half of the storage contract; [`Self::load`]
    /// is the read half.
    pub fn put(&self, object_type: ObjectType, content: &[u8]) -> anyhow::Result<ObjectId> {
        let mut framed = Vec::with_capacity(content.len() + 16);
        framed.extend_from_slice(format!("{} {}\0", object_type, content.len()).as_bytes());
        framed.extend_from_slice(content);

        let framed = Bytes::from(framed);
        let oid = hash_framed(&framed)?;

        self.write_if_absent(&oid, framed)?;

        Ok(oid)
    }

    /// Reads an object's kind and content back, from the loose tier or a
    /// pack. Fails with [`RepositoryError::NotFound`] when the id is
    /// unknown and [`RepositoryError::CorruptObject`] when the stored bytes
    /// do not hash back to the id.
    pub fn load(&self, object_id: &ObjectId) -> anyhow::Result<(ObjectType, Bytes)> {
        let object_path = self.path.join(object_id.to_path());

        if object_path.exists() {
            let framed = self.read_loose(object_id, object_path)?;
            return split_frame(object_id, framed);
        }

        if let Some(found) = self.read_packed(object_id)? {
            return Ok(found);
        }

        Err(RepositoryError::NotFound(object_id.to_string()).into())
    }

    /// Whether the object is present in either tier.
    pub fn exists(&self, object_id: &ObjectId) -> bool {
        if self.path.join(object_id.to_path()).exists() {
            return true;
        }

        if self.packs.borrow().iter().any(|pack| pack.contains(object_id)) {
            return true;
        }

        matches!(self.refresh_packs(), Ok(true))
            && self.packs.borrow().iter().any(|pack| pack.contains(object_id))
    }

    pub fn parse_object(&self, object_id: &ObjectId) -> anyhow::Result<ObjectBox> {
        let (object_type, object_reader) = self.parse_object_as_bytes(object_id)?;

        match object_type {
            ObjectType::Blob => Ok(ObjectBox::Blob(Box::new(Blob::deserialize(object_reader)?))),
            ObjectType::Tree => Ok(ObjectBox::Tree(Box::new(Tree::deserialize(object_reader)?))),
            ObjectType::Commit => Ok(ObjectBox::Commit(Box::new(Commit::deserialize(
                object_reader,
            )?))),
            ObjectType::Tag => Ok(ObjectBox::Tag(Box::new(Tag::deserialize(object_reader)?))),
        }
    }

    pub fn parse_object_as_blob(&self, object_id: &ObjectId) -> anyhow::Result<Option<Blob>> {
        let (object_type, object_reader) = self.parse_object_as_bytes(object_id)?;

        match object_type {
            ObjectType::Blob => Ok(Some(Blob::deserialize(object_reader)?)),
            _ => Ok(None),
        }
    }

    pub fn parse_object_as_tree(&self, object_id: &ObjectId) -> anyhow::Result<Option<Tree>> {
        let (object_type, object_reader) = self.parse_object_as_bytes(object_id)?;

        match object_type {
            ObjectType::Tree => Ok(Some(Tree::deserialize(object_reader)?)),
            _ => Ok(None),
        }
    }

    pub fn parse_object_as_commit(&self, object_id: &ObjectId) -> anyhow::Result<Option<Commit>> {
        let (object_type, object_reader) = self.parse_object_as_bytes(object_id)?;

        match object_type {
            ObjectType::Commit => Ok(Some(Commit::deserialize(object_reader)?)),
            _ => Ok(None),
        }
    }

    pub fn parse_object_as_tag(&self, object_id: &ObjectId) -> anyhow::Result<Option<Tag>> {
        let (object_type, object_reader) = self.parse_object_as_bytes(object_id)?;

        match object_type {
            ObjectType::Tag => Ok(Some(Tag::deserialize(object_reader)?)),
            _ => Ok(None),
        }
    }

    /// Get the type of an object without keeping its content around.
    pub fn get_object_type(&self, object_id: &ObjectId) -> anyhow::Result<ObjectType> {
        let (object_type, _) = self.load(object_id)?;
        Ok(object_type)
    }

    fn parse_object_as_bytes(
        &self,
        object_id: &ObjectId,
    ) -> anyhow::Result<(ObjectType, impl BufRead)> {
        let (object_type, content) = self.load(object_id)?;

        Ok((object_type, Cursor::new(content)))
    }

    fn read_loose(&self, object_id: &ObjectId, object_path: PathBuf) -> anyhow::Result<Bytes> {
        let compressed = std::fs::read(&object_path).context(format!(
            "Unable to read object file {}",
            object_path.display()
        ))?;

        let framed = match Self::decompress(compressed.into()) {
            Ok(framed) => framed,
            Err(_) => {
                return Err(RepositoryError::CorruptObject {
                    oid: object_id.clone(),
                    reason: "stored bytes are not valid zlib".to_string(),
                }
                .into());
            }
        };

        let actual = hash_framed(&framed)?;

        if &actual != object_id {
            return Err(RepositoryError::CorruptObject {
                oid: object_id.clone(),
                reason: format!("stored content hashes to {}", actual),
            }
            .into());
        }

        Ok(framed)
    }

    fn read_packed(&self, object_id: &ObjectId) -> anyhow::Result<Option<(ObjectType, Bytes)>> {
        for pack in self.packs.borrow().iter() {
            if pack.contains(object_id) {
                return pack.read_object(object_id).map(Some);
            }
        }

        // A pack may have been published since the last scan.
        if self.refresh_packs()? {
            for pack in self.packs.borrow().iter() {
                if pack.contains(object_id) {
                    return pack.read_object(object_id).map(Some);
                }
            }
        }

        Ok(None)
    }

    /// Rescans the pack directory, opening any pair that appeared since the
    /// last call. Returns whether anything new was found.
    fn refresh_packs(&self) -> anyhow::Result<bool> {
        let pack_dir = self.pack_path();

        if !pack_dir.is_dir() {
            return Ok(false);
        }

        let mut packs = self.packs.borrow_mut();
        let mut added = false;

        for entry in std::fs::read_dir(&pack_dir)? {
            let index_path = entry?.path();

            if index_path.extension().is_none_or(|extension| extension != "idx") {
                continue;
            }

            let pack_file_path = index_path.with_extension("pack");

            if !pack_file_path.exists()
                || packs.iter().any(|pack| pack.pack_path() == pack_file_path)
            {
                continue;
            }

            debug!(pack = %pack_file_path.display(), "opening a freshly published pack");
            packs.push(PackReader::open(&pack_file_path)?);
            added = true;
        }

        Ok(added)
    }

    fn write_if_absent(&self, object_id: &ObjectId, framed: Bytes) -> anyhow::Result<()> {
        let object_path = self.path.join(object_id.to_path());

        if object_path.exists() || self.packed_contains(object_id) {
            return Ok(());
        }

        std::fs::create_dir_all(
            object_path
                .parent()
                .context(format!("Invalid object path {}", object_path.display()))?,
        )
        .context(format!(
            "Unable to create object directory {}",
            object_path.display()
        ))?;

        self.write_object(object_path, framed)
    }

    fn packed_contains(&self, object_id: &ObjectId) -> bool {
        self.packs.borrow().iter().any(|pack| pack.contains(object_id))
    }

    fn write_object(&self, object_path: PathBuf, object_content: Bytes) -> anyhow::Result<()> {
        let object_dir = object_path
            .parent()
            .context(format!("Invalid object path {}", object_path.display()))?;
        let temp_object_path = object_dir.join(Self::generate_temp_name());

        // compress the object content
        let object_content = Self::compress(object_content)?;

        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_object_path)
            .context(format!(
                "Unable to open object file {}",
                temp_object_path.display()
            ))?;

        file.write_all(&object_content).context(format!(
            "Unable to write object file {}",
            temp_object_path.display()
        ))?;

        // rename the temp file to the object file to make it atomic
        std::fs::rename(&temp_object_path, &object_path).context(format!(
            "Unable to rename object file to {}",
            object_path.display()
        ))?;

        Ok(())
    }

    fn compress(data: Bytes) -> anyhow::Result<Bytes> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder
            .write_all(&data)
            .context("Unable to compress object content")?;

        encoder
            .finish()
            .map(|compressed_content| compressed_content.into())
            .context("Unable to finish compressing object content")
    }

    fn decompress(data: Bytes) -> anyhow::Result<Bytes> {
        let mut decoder = flate2::read::ZlibDecoder::new(&*data);
        let mut decompressed_content = Vec::new();
        decoder
            .read_to_end(&mut decompressed_content)
            .context("Unable to decompress object content")?;

        Ok(decompressed_content.into())
    }

    fn generate_temp_name() -> String {
        format!("tmp-obj-{}", rand::random::<u32>())
    }

    /// Find all objects whose OID starts with the given prefix, across both
    /// tiers. Used to resolve abbreviated OIDs to their full form; more
    /// than one match means the prefix is ambiguous.
    pub fn find_objects_by_prefix(&self, prefix: &str) -> anyhow::Result<Vec<ObjectId>> {
        let mut matches = Vec::new();

        // For prefixes of 2+ characters only the one fanout directory needs
        // scanning; shorter prefixes have to walk all of them.
        if prefix.len() >= 2 {
            let dir_name = &prefix[..2];
            let file_prefix = &prefix[2..];
            let dir_path = self.path.join(dir_name);

            if dir_path.is_dir() {
                for entry in std::fs::read_dir(&dir_path)? {
                    let entry = entry?;
                    let file_name = entry.file_name();
                    let file_name_str = file_name.to_string_lossy();

                    if file_name_str.starts_with(file_prefix) {
                        let full_oid = format!("{}{}", dir_name, file_name_str);
                        if let Ok(oid) = ObjectId::try_parse(full_oid) {
                            matches.push(oid);
                        }
                    }
                }
            }
        } else {
            for i in 0..=255 {
                let dir_name = format!("{:02x}", i);
                let dir_path = self.path.join(&dir_name);

                if dir_path.is_dir() {
                    for entry in std::fs::read_dir(&dir_path)? {
                        let entry = entry?;
                        let file_name = entry.file_name();
                        let file_name_str = file_name.to_string_lossy();
                        let full_oid = format!("{}{}", dir_name, file_name_str);

                        if full_oid.starts_with(prefix)
                            && let Ok(oid) = ObjectId::try_parse(full_oid)
                        {
                            matches.push(oid);
                        }
                    }
                }
            }
        }

        self.refresh_packs()?;

        for pack in self.packs.borrow().iter() {
            for oid in pack.index().object_ids() {
                if oid.as_ref().starts_with(prefix) {
                    matches.push(oid.clone());
                }
            }
        }

        // An object can sit in both tiers until the loose copy is pruned.
        matches.sort_unstable_by(|left, right| left.as_ref().cmp(right.as_ref()));
        matches.dedup();

        Ok(matches)
    }

    /// Lists every object currently stored loose, pack directory excluded.
    pub fn list_loose_objects(&self) -> anyhow::Result<Vec<ObjectId>> {
        let mut oids = Vec::new();

        if !self.path.is_dir() {
            return Ok(oids);
        }

        for entry in std::fs::read_dir(&*self.path)? {
            let dir_path = entry?.path();
            let Some(dir_name) = dir_path.file_name().map(|name| name.to_string_lossy().to_string())
            else {
                continue;
            };

            if dir_name.len() != 2
                || !dir_name.chars().all(|c| c.is_ascii_hexdigit())
                || !dir_path.is_dir()
            {
                continue;
            }

            for file in std::fs::read_dir(&dir_path)? {
                let file_name = file?.file_name();
                let full_oid = format!("{}{}", dir_name, file_name.to_string_lossy());

                if let Ok(oid) = ObjectId::try_parse(full_oid) {
                    oids.push(oid);
                }
            }
        }

        Ok(oids)
    }

    /// Deletes the loose copy of an object, trimming its fanout directory
    /// when that leaves it empty. Packed copies are untouched.
    pub fn remove_loose_object(&self, object_id: &ObjectId) -> anyhow::Result<()> {
        let object_path = self.path.join(object_id.to_path());

        if !object_path.exists() {
            return Ok(());
        }

        std::fs::remove_file(&object_path).context(format!(
            "Unable to remove object file {}",
            object_path.display()
        ))?;

        if let Some(parent) = object_path.parent() {
            let _ = std::fs::remove_dir(parent);
        }

        Ok(())
    }
}

fn hash_framed(framed: &[u8]) -> anyhow::Result<ObjectId> {
    ObjectId::try_parse(format!("{:x}", Sha1::digest(framed)))
}

/// Splits framed bytes into their declared kind and content, cross-checking
/// the declared size.
fn split_frame(object_id: &ObjectId, framed: Bytes) -> anyhow::Result<(ObjectType, Bytes)> {
    let mut cursor = Cursor::new(framed);
    let (object_type, size) = match ObjectType::parse_header(&mut cursor) {
        Ok(parsed) => parsed,
        Err(error) => {
            return Err(RepositoryError::CorruptObject {
                oid: object_id.clone(),
                reason: format!("malformed object header: {}", error),
            }
            .into());
        }
    };

    let header_len = cursor.position() as usize;
    let content = cursor.into_inner().slice(header_len..);

    if content.len() != size {
        return Err(RepositoryError::CorruptObject {
            oid: object_id.clone(),
            reason: format!("header declares {} bytes but {} are stored", size, content.len()),
        }
        .into());
    }

    Ok((object_type, content))
}

/// Memoizes the commit fields that graph traversals touch, so repeated
/// walks over the same history parse each commit at most once.
#[derive(Debug, Default)]
pub struct CommitCache {
    commits: RefCell<HashMap<ObjectId, SlimCommit>>,
}

impl CommitCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(
        &self,
        database: &Database,
        object_id: &ObjectId,
    ) -> anyhow::Result<SlimCommit> {
        if let Some(slim) = self.commits.borrow().get(object_id) {
            return Ok(slim.clone());
        }

        let commit = database
            .parse_object_as_commit(object_id)?
            .with_context(|| format!("object {} is not a commit", object_id))?;
        let slim = commit.to_slim(object_id.clone());

        self.commits
            .borrow_mut()
            .insert(object_id.clone(), slim.clone());

        Ok(slim)
    }
}
