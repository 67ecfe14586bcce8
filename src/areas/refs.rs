//! References (branches, HEAD, tags)
//!
//! This module manages references, the mutable human-readable names pointing
//! at commits. References can be:
//! - Direct: Containing an object id
//! - Symbolic: Pointing to another reference (e.g., HEAD -> refs/heads/master)
//!
//! ## Reference Types
//!
//! - HEAD: Special reference pointing to the current branch or commit
//! - Branches: refs/heads/* pointing to branch tip commits
//! - Tags: refs/tags/* pointing to tagged objects
//!
//! ## File Format
//!
//! References are stored as text files containing either:
//! - A 40-character SHA-1 hash (direct reference)
//! - `ref: <path>` for symbolic references
//!
//! ## Locking
//!
//! Every mutation goes through a sibling `<name>.lock` file created with
//! `O_CREAT|O_EXCL`, so two writers can never interleave: the new value is
//! written to the lock file and renamed over the reference. An update only
//! lands when the value read under the lock still matches what the caller
//! expected; anything else surfaces as a conflict.

use crate::artifacts::branch::branch_name::{BranchName, SymRefName};
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::RepositoryError;
use anyhow::Context;
use derive_new::new;
use file_guard::Lock;
use std::collections::HashSet;
use std::io::Write;
use std::ops::DerefMut;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// References manager
///
/// Handles reading and writing references (branches, HEAD, tags).
/// Provides safe concurrent access through lock files.
#[derive(Debug, new)]
pub struct Refs {
    /// Path to the refs directory (typically `.git`)
    path: Box<Path>,
}

/// Regex pattern for parsing symbolic references
const SYMREF_REGEX: &str = r"^ref: (.+)$";

/// Name of the HEAD reference
pub const HEAD_REF_NAME: &str = "HEAD";

/// How many links a symbolic chain may have before it is declared a cycle.
pub const MAX_SYMREF_DEPTH: usize = 5;

/// How many compare-and-swap rounds a retrying update gets before the
/// conflict is handed to the caller.
pub const UPDATE_RETRY_ATTEMPTS: usize = 3;

/// How often a writer polls a busy lock file before giving up.
const LOCK_ATTEMPTS: usize = 50;

/// Pause between lock polls.
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Internal representation of a reference value
///
/// Can be either a symbolic reference or a direct object ID.
#[derive(Debug, Clone)]
enum SymRefOrOid {
    /// Symbolic reference pointing to another ref
    SymRef { sym_ref_name: SymRefName },
    /// Direct object ID
    Oid(ObjectId),
}

impl SymRefOrOid {
    fn read_symref_or_oid(path: &Path) -> anyhow::Result<Option<SymRefOrOid>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)?;
        let content = content.trim();

        if content.is_empty() {
            return Ok(None);
        }

        let symref_match = regex::Regex::new(SYMREF_REGEX)?.captures(content);
        if let Some(symref_match) = symref_match {
            Ok(Some(SymRefOrOid::SymRef {
                sym_ref_name: SymRefName::new(symref_match[1].to_string()),
            }))
        } else {
            Ok(Some(SymRefOrOid::Oid(ObjectId::try_parse(
                content.to_string(),
            )?)))
        }
    }
}

/// A held `<name>.lock` file. Dropping it removes the lock unless the lock
/// file was renamed over its reference first.
struct RefLock {
    lock_path: PathBuf,
    file: Option<std::fs::File>,
    persisted: bool,
}

impl RefLock {
    fn acquire(lock_path: PathBuf) -> anyhow::Result<Self> {
        for attempt in 0..LOCK_ATTEMPTS {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(file) => {
                    return Ok(RefLock {
                        lock_path,
                        file: Some(file),
                        persisted: false,
                    });
                }
                Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {
                    debug!(lock = %lock_path.display(), attempt, "ref lock is busy");
                    std::thread::sleep(LOCK_RETRY_DELAY);
                }
                Err(error) => {
                    return Err(error)
                        .with_context(|| format!("failed to create lock file at {:?}", lock_path));
                }
            }
        }

        anyhow::bail!("timed out waiting for the lock at {:?}", lock_path)
    }

    /// Writes the new value and renames the lock file over the reference,
    /// making the update atomic for readers.
    fn commit(mut self, ref_path: &Path, value: &str) -> anyhow::Result<()> {
        let mut file = self
            .file
            .take()
            .with_context(|| format!("lock file at {:?} was already released", self.lock_path))?;
        file.write_all(value.as_bytes())
            .with_context(|| format!("failed to write lock file at {:?}", self.lock_path))?;
        drop(file);

        std::fs::rename(&self.lock_path, ref_path)
            .with_context(|| format!("failed to publish ref file at {:?}", ref_path))?;
        self.persisted = true;

        Ok(())
    }
}

impl Drop for RefLock {
    fn drop(&mut self) {
        if !self.persisted {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

impl Refs {
    /// Check if a branch is the currently checked-out branch
    pub fn is_current_branch(&self, branch_name: &BranchName) -> anyhow::Result<bool> {
        let current_ref = self.current_ref(None)?;

        if current_ref.is_detached_head() {
            return Ok(false);
        }

        Ok(branch_name == &BranchName::try_parse_sym_ref_name(&current_ref)?)
    }

    /// Read the object ID that a symbolic reference points to
    pub fn read_oid(&self, sym_ref_name: &SymRefName) -> anyhow::Result<Option<ObjectId>> {
        self.read_ref(sym_ref_name.as_ref_path())
    }

    /// Get the current symbolic reference
    ///
    /// Follows symbolic references to find the final one in the chain.
    /// For example, if HEAD points to refs/heads/main, returns refs/heads/main.
    ///
    /// # Arguments
    ///
    /// * `source` - Starting reference (defaults to HEAD if None)
    pub fn current_ref(&self, source: Option<SymRefName>) -> anyhow::Result<SymRefName> {
        let mut current = source.unwrap_or_else(|| SymRefName::new(HEAD_REF_NAME.to_string()));

        for _ in 0..=MAX_SYMREF_DEPTH {
            let ref_content =
                SymRefOrOid::read_symref_or_oid(self.path.join(current.as_ref_path()).as_path())?;

            match ref_content {
                Some(SymRefOrOid::SymRef { sym_ref_name }) => current = sym_ref_name,
                Some(_) | None => return Ok(current),
            }
        }

        Err(RepositoryError::ReferenceCycle {
            name: current.to_string(),
        }
        .into())
    }

    /// Read a reference by name, following symbolic indirection.
    ///
    /// The name may be `HEAD`, a full `refs/...` path, or a bare branch or
    /// tag name. Returns `None` when no such reference exists or a link in
    /// its chain is missing; a cyclic chain is still an error.
    pub fn read_ref(&self, name: &str) -> anyhow::Result<Option<ObjectId>> {
        match self.find_existing_ref_path(name) {
            Some(path) => self.follow_symrefs(name, &path, false),
            None => Ok(None),
        }
    }

    /// Resolve a reference by name to the object id at the end of its
    /// symbolic chain.
    ///
    /// Unlike [`Self::read_ref`] this is strict: a missing reference is
    /// [`RepositoryError::NotFound`], a missing link in the chain is
    /// [`RepositoryError::DanglingReference`] and a chain that revisits a
    /// reference or outgrows [`MAX_SYMREF_DEPTH`] is
    /// [`RepositoryError::ReferenceCycle`].
    pub fn resolve(&self, name: &str) -> anyhow::Result<ObjectId> {
        let Some(path) = self.find_existing_ref_path(name) else {
            return Err(RepositoryError::NotFound(name.to_string()).into());
        };

        match self.follow_symrefs(name, &path, true)? {
            Some(oid) => Ok(oid),
            None => Err(RepositoryError::NotFound(name.to_string()).into()),
        }
    }

    fn follow_symrefs(
        &self,
        start_name: &str,
        start_path: &Path,
        strict: bool,
    ) -> anyhow::Result<Option<ObjectId>> {
        let mut visited: HashSet<PathBuf> = HashSet::new();
        let mut current_name = start_name.to_string();
        let mut current_path = start_path.to_path_buf();

        for depth in 0..=MAX_SYMREF_DEPTH {
            if !visited.insert(current_path.clone()) {
                return Err(RepositoryError::ReferenceCycle {
                    name: start_name.to_string(),
                }
                .into());
            }

            match SymRefOrOid::read_symref_or_oid(&current_path)? {
                Some(SymRefOrOid::Oid(oid)) => return Ok(Some(oid)),
                Some(SymRefOrOid::SymRef { sym_ref_name }) => {
                    current_path = self.path.join(sym_ref_name.as_ref_path());
                    current_name = sym_ref_name.to_string();
                }
                None if depth == 0 || !strict => return Ok(None),
                None => {
                    return Err(RepositoryError::DanglingReference {
                        name: start_name.to_string(),
                        target: current_name,
                    }
                    .into());
                }
            }
        }

        Err(RepositoryError::ReferenceCycle {
            name: start_name.to_string(),
        }
        .into())
    }

    /// Atomically replace a reference's value, but only while it still holds
    /// what the caller last saw.
    ///
    /// `expected == None` asserts the reference does not exist yet and
    /// `new == None` deletes it. Any mismatch between `expected` and the
    /// value read under the lock is a [`RepositoryError::Conflict`]; nothing
    /// is modified in that case.
    pub fn compare_and_swap(
        &self,
        name: &str,
        expected: Option<&ObjectId>,
        new: Option<&ObjectId>,
    ) -> anyhow::Result<()> {
        let ref_path = self.target_ref_path(name);

        std::fs::create_dir_all(ref_path.parent().with_context(|| {
            format!("failed to locate the parent directory of {:?}", ref_path)
        })?)?;

        let lock = RefLock::acquire(lock_path_for(&ref_path))?;

        // A symbolic file never matches a direct expectation.
        let (is_symbolic, actual) = match SymRefOrOid::read_symref_or_oid(&ref_path)? {
            Some(SymRefOrOid::Oid(oid)) => (false, Some(oid)),
            Some(SymRefOrOid::SymRef { .. }) => (true, None),
            None => (false, None),
        };

        if is_symbolic || actual.as_ref() != expected {
            return Err(RepositoryError::Conflict {
                name: name.to_string(),
                expected: expected.cloned(),
                actual,
            }
            .into());
        }

        match new {
            Some(oid) => lock.commit(&ref_path, oid.as_ref())?,
            None => {
                if ref_path.exists() {
                    std::fs::remove_file(&ref_path).with_context(|| {
                        format!("failed to delete ref file at {:?}", ref_path)
                    })?;
                }

                drop(lock);
                self.prune_empty_parent_dirs(&ref_path)?;
            }
        }

        Ok(())
    }

    /// Run a compare-and-swap loop: read the current value, let the caller
    /// compute the replacement, and retry a bounded number of times when a
    /// concurrent writer got there first.
    pub fn update_with_retry(
        &self,
        name: &str,
        mut compute: impl FnMut(Option<&ObjectId>) -> anyhow::Result<Option<ObjectId>>,
    ) -> anyhow::Result<Option<ObjectId>> {
        let mut attempt = 0;

        loop {
            let current = match SymRefOrOid::read_symref_or_oid(&self.target_ref_path(name))? {
                Some(SymRefOrOid::Oid(oid)) => Some(oid),
                Some(SymRefOrOid::SymRef { .. }) | None => None,
            };

            let new = compute(current.as_ref())?;

            match self.compare_and_swap(name, current.as_ref(), new.as_ref()) {
                Ok(()) => return Ok(new),
                Err(error) => {
                    attempt += 1;

                    let conflicted = crate::errors::as_repository_error(&error)
                        .is_some_and(|err| matches!(err, RepositoryError::Conflict { .. }));

                    if !conflicted || attempt >= UPDATE_RETRY_ATTEMPTS {
                        return Err(error);
                    }

                    warn!(name, attempt, "reference moved underneath an update, retrying");
                }
            }
        }
    }

    /// Point HEAD at a branch that may not have been born yet.
    pub fn init_head(&self, branch_name: &BranchName) -> anyhow::Result<()> {
        self.update_ref_file(
            self.head_path(),
            format!("ref: refs/heads/{}", branch_name),
        )
    }

    pub fn set_head(&self, revision: &str, raw_ref: String) -> anyhow::Result<()> {
        let revision_path = self.heads_path().join(revision).into_boxed_path();

        if revision_path.exists() {
            self.update_ref_file(self.head_path(), format!("ref: refs/heads/{}", revision))
        } else {
            self.update_ref_file(self.head_path(), raw_ref)
        }
    }

    pub fn read_head(&self) -> anyhow::Result<Option<ObjectId>> {
        self.read_ref(HEAD_REF_NAME)
    }

    fn update_ref_file(&self, path: Box<Path>, raw_ref: String) -> anyhow::Result<()> {
        // create all the parent directories if they don't exist
        std::fs::create_dir_all(path.parent().with_context(|| {
            format!(
                "failed to create parent directories for ref file at {:?}",
                path
            )
        })?)?;

        // open the ref file as WRONLY and CREAT to write the value to it
        let mut ref_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.clone())
            .with_context(|| format!("failed to open ref file at {:?}", path))?;
        let mut lock = file_guard::lock(&mut ref_file, Lock::Exclusive, 0, 1)?;
        lock.deref_mut().write_all(raw_ref.as_bytes())?;

        Ok(())
    }

    pub fn create_branch(&self, name: &BranchName, source_oid: ObjectId) -> anyhow::Result<()> {
        self.compare_and_swap(name.as_ref(), None, Some(&source_oid))
    }

    pub fn delete_branch(&self, name: &BranchName) -> anyhow::Result<ObjectId> {
        let branch_path = self.heads_path().join(name.as_ref()).into_boxed_path();

        match SymRefOrOid::read_symref_or_oid(&branch_path)? {
            Some(SymRefOrOid::Oid(oid)) => {
                self.compare_and_swap(name.as_ref(), Some(&oid), None)?;

                Ok(oid)
            }
            Some(SymRefOrOid::SymRef { .. }) | None => Err(RepositoryError::NotFound(
                format!("refs/heads/{}", name),
            )
            .into()),
        }
    }

    pub fn list_branches(&self) -> anyhow::Result<Vec<SymRefName>> {
        let mut branches = self.list_refs(self.heads_path().as_ref())?;
        branches.sort();

        Ok(branches)
    }

    pub fn create_tag(&self, name: &BranchName, target: ObjectId) -> anyhow::Result<()> {
        self.compare_and_swap(&format!("refs/tags/{}", name), None, Some(&target))
    }

    /// List references whose full name starts with `prefix`, HEAD included,
    /// sorted by name.
    pub fn list(&self, prefix: &str) -> anyhow::Result<Vec<SymRefName>> {
        let mut refs: Vec<SymRefName> = self
            .list_refs(self.refs_path().as_ref())?
            .into_iter()
            .chain(
                self.head_path()
                    .exists()
                    .then(|| SymRefName::new(HEAD_REF_NAME.to_string())),
            )
            .filter(|sym_ref| sym_ref.as_ref_path().starts_with(prefix))
            .collect();
        refs.sort();

        Ok(refs)
    }

    fn list_refs(&self, path: &Path) -> anyhow::Result<Vec<SymRefName>> {
        Ok(WalkDir::new(path)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                if entry.path().is_file() {
                    let relative_path = entry.path().strip_prefix(self.path.as_ref()).ok()?;
                    Some(SymRefName::new(relative_path.to_string_lossy().to_string()))
                } else {
                    None
                }
            })
            .filter(|sym_ref| !sym_ref.as_ref_path().ends_with(".lock"))
            .collect::<Vec<_>>())
    }

    /// The canonical location updates for `name` land in: `.git/HEAD` for
    /// HEAD, the literal path below `.git` for full `refs/...` names, and
    /// `refs/heads` for bare branch names. An existing file in one of the
    /// lookup locations wins over the canonical spot.
    fn target_ref_path(&self, name: &str) -> PathBuf {
        if let Some(existing) = self.find_existing_ref_path(name) {
            return existing;
        }

        if name == HEAD_REF_NAME {
            self.path.join(HEAD_REF_NAME)
        } else if name.starts_with("refs/") {
            self.path.join(name)
        } else {
            self.heads_path().join(name)
        }
    }

    fn find_existing_ref_path(&self, name: &str) -> Option<PathBuf> {
        [
            self.path.to_path_buf(),
            self.refs_path().to_path_buf(),
            self.tags_path().to_path_buf(),
            self.heads_path().to_path_buf(),
        ]
        .iter()
        .map(|base_path| base_path.join(name))
        .find(|path| path.is_file())
    }

    fn prune_empty_parent_dirs(&self, path: &Path) -> anyhow::Result<()> {
        let stop_at = [self.heads_path(), self.tags_path(), self.refs_path()];

        if let Some(parent) = path.parent()
            && parent.is_dir()
            && !stop_at.iter().any(|base| base.as_ref() == parent)
            && parent.starts_with(self.refs_path())
            && parent.read_dir()?.next().is_none()
        {
            std::fs::remove_dir(parent)
                .with_context(|| format!("failed to remove empty ref directory at {:?}", parent))?;
            self.prune_empty_parent_dirs(parent)?;
        }

        Ok(())
    }

    pub fn head_path(&self) -> Box<Path> {
        self.path.join(HEAD_REF_NAME).into_boxed_path()
    }

    pub fn refs_path(&self) -> Box<Path> {
        self.path.join("refs").into_boxed_path()
    }

    pub fn heads_path(&self) -> Box<Path> {
        self.refs_path().join("heads").into_boxed_path()
    }

    pub fn tags_path(&self) -> Box<Path> {
        self.refs_path().join("tags").into_boxed_path()
    }
}

fn lock_path_for(ref_path: &Path) -> PathBuf {
    let mut lock_path = ref_path.as_os_str().to_os_string();
    lock_path.push(".lock");

    PathBuf::from(lock_path)
}
