//! Change detection primitives
//!
//! The inspector answers, per path, the two questions every state
//! read-out reduces to: does the worktree still match the index, and
//! does the index still match the HEAD tree. Content is only rehashed
//! when the cheap stat comparison cannot rule a change out.

use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
use crate::artifacts::objects::object::Object;
use crate::artifacts::status::file_change::{IndexChangeType, WorkspaceChangeType};
use derive_new::new;
use std::path::Path;

#[derive(new)]
pub struct Inspector<'r> {
    repository: &'r Repository,
}

impl<'r> Inspector<'r> {
    /// Whether anything at or below `path` is tracked by the index.
    /// An empty directory counts as tracked so it never surfaces as
    /// untracked noise.
    pub fn is_indirectly_tracked(&self, path: &Path, index: &Index) -> anyhow::Result<bool> {
        let absolute = self.repository.workspace().path().join(path);

        if absolute.is_file() {
            return Ok(index.is_directly_tracked(path));
        }

        let children = self.repository.workspace().list_dir(Some(&absolute))?;
        let is_file =
            |p: &std::path::PathBuf| self.repository.workspace().path().join(p).is_file();
        let files = children.iter().filter(|p| is_file(p));
        let dirs = children.iter().filter(|p| !is_file(p));

        // Files first: a tracked file settles the question without
        // descending into sibling directories.
        let mut children = files.chain(dirs);

        if children.clone().count() == 0 {
            Ok(true)
        } else {
            Ok(children.any(|p| self.is_indirectly_tracked(p, index).unwrap_or(false)))
        }
    }

    fn is_content_changed(&self, index_entry: &IndexEntry) -> anyhow::Result<bool> {
        let blob = self.repository.workspace().parse_blob(&index_entry.name)?;
        let oid = blob.object_id()?;

        Ok(oid != index_entry.oid)
    }

    /// Compare an index entry against a fresh worktree stat. Matching
    /// stat and timestamps short-circuit without touching content; a
    /// stat mismatch that could be benign falls back to rehashing.
    pub fn check_index_against_workspace(
        &self,
        entry: Option<&IndexEntry>,
        stat: Option<&EntryMetadata>,
    ) -> anyhow::Result<WorkspaceChangeType> {
        match (entry, stat) {
            (None, _) => Ok(WorkspaceChangeType::Untracked),
            (Some(_), None) => Ok(WorkspaceChangeType::Deleted),
            (Some(entry), Some(stat)) if !entry.stat_match(stat) => {
                Ok(WorkspaceChangeType::Modified)
            }
            (Some(entry), Some(stat)) if entry.stat_match(stat) && entry.times_match(stat) => {
                Ok(WorkspaceChangeType::None)
            }
            (Some(entry), Some(_)) if self.is_content_changed(entry)? => {
                Ok(WorkspaceChangeType::Modified)
            }
            _ => Ok(WorkspaceChangeType::None),
        }
    }

    /// Compare an index entry against the corresponding HEAD tree entry.
    /// Both sides are already content-addressed, so this never touches
    /// the object store.
    pub fn check_index_against_head_tree(
        &self,
        index_entry: Option<&IndexEntry>,
        head_entry: Option<&DatabaseEntry>,
    ) -> IndexChangeType {
        match (index_entry, head_entry) {
            (Some(index_entry), Some(head_entry))
                if head_entry.mode != index_entry.metadata.mode
                    || head_entry.oid != index_entry.oid =>
            {
                IndexChangeType::Modified
            }
            (Some(_), None) => IndexChangeType::Added,
            (None, Some(_)) => IndexChangeType::Deleted,
            _ => IndexChangeType::None,
        }
    }
}
