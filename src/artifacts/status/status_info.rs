//! Status aggregation
//!
//! One pass over the worktree, the index and the HEAD tree produces a
//! [`StatusInfo`]: untracked paths, per-path change verdicts, and the
//! flattened HEAD tree they were judged against. The scan also refreshes
//! stale stat metadata on entries whose content turned out unchanged, so
//! the next scan can short-circuit on timestamps again.

use crate::areas::database::Database;
use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
use crate::artifacts::status::file_change::{
    FileChange, IndexChangeType, PathState, WorkspaceChangeType,
};
use crate::artifacts::status::inspector::Inspector;
use derive_new::new;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

pub type FileStatSet = BTreeMap<PathBuf, EntryMetadata>;
pub type FileSet = BTreeSet<PathBuf>;
pub type HeadTree = BTreeMap<PathBuf, DatabaseEntry>;

/// Snapshot of everything the scan found.
#[derive(Debug, Clone)]
pub struct StatusInfo {
    /// Fresh stats of tracked worktree files
    file_stats: FileStatSet,
    /// Paths (or whole directories, keyed with a trailing separator)
    /// nothing in the index accounts for
    untracked_files: FileSet,
    /// Paths where at least one comparison edge reported a change
    changed_files: BTreeMap<PathBuf, FileChange>,
    /// HEAD commit's tree, flattened to blob paths
    head_tree: HeadTree,
}

impl StatusInfo {
    pub fn untracked_files(&self) -> &FileSet {
        &self.untracked_files
    }

    pub fn changed_files(&self) -> &BTreeMap<PathBuf, FileChange> {
        &self.changed_files
    }

    pub fn head_tree(&self) -> &HeadTree {
        &self.head_tree
    }

    /// Paths whose worktree content diverges from the index.
    pub fn workspace_changes(&self) -> impl Iterator<Item = (&PathBuf, &WorkspaceChangeType)> {
        self.changed_files
            .iter()
            .filter(|(_, change)| change.workspace_change != WorkspaceChangeType::None)
            .map(|(path, change)| (path, &change.workspace_change))
    }

    /// Paths whose index entry diverges from the HEAD tree.
    pub fn index_changes(&self) -> impl Iterator<Item = (&PathBuf, &IndexChangeType)> {
        self.changed_files
            .iter()
            .filter(|(_, change)| change.index_change != IndexChangeType::None)
            .map(|(path, change)| (path, &change.index_change))
    }

    /// Read a path's position in the tracked-file lifecycle off the
    /// collected verdicts.
    pub fn path_state(&self, path: &Path) -> PathState {
        // Change verdicts win over the untracked set: a path dropped from
        // the index but still on disk is Removed, not Untracked.
        if let Some(change) = self.changed_files.get(path) {
            return PathState::from(change);
        }

        if self.untracked_files.contains(path) {
            return PathState::Untracked;
        }

        // A file inside an untracked directory is reported under the
        // directory, not under its own path.
        let in_untracked_dir = self
            .untracked_files
            .iter()
            .any(|untracked| path.starts_with(untracked));
        if in_untracked_dir {
            return PathState::Untracked;
        }

        if self.file_stats.contains_key(path) || self.head_tree.contains_key(path) {
            PathState::Unmodified
        } else {
            PathState::Untracked
        }
    }
}

/// The scan itself; see [`Status::initialize`].
#[derive(new)]
pub struct Status<'r> {
    repository: &'r Repository,
}

impl<'r> Status<'r> {
    /// Walk the worktree, then judge every index entry against both the
    /// collected stats and the HEAD tree. The index is only touched to
    /// refresh stat metadata of entries proven unchanged.
    pub async fn initialize(&self, index: &mut Index) -> anyhow::Result<StatusInfo> {
        let mut file_stats = FileStatSet::new();
        let mut untracked_files = FileSet::new();

        let inspector = Inspector::new(self.repository);

        self.scan_workspace(
            None,
            &mut untracked_files,
            &mut file_stats,
            index,
            &inspector,
        )
        .await?;

        let head_tree = self.load_head_tree()?;
        let mut changed_files =
            self.check_index_entries(&file_stats, &head_tree, index, &inspector)?;
        self.collect_deleted_head_files(&head_tree, index, &mut changed_files);

        Ok(StatusInfo {
            file_stats,
            untracked_files,
            changed_files,
            head_tree,
        })
    }

    async fn scan_workspace(
        &self,
        prefix_path: Option<&Path>,
        untracked_files: &mut FileSet,
        file_stats: &mut FileStatSet,
        index: &Index,
        inspector: &Inspector<'_>,
    ) -> anyhow::Result<()> {
        let workspace = self.repository.workspace();
        let absolute_prefix = prefix_path.map(|p| workspace.path().join(p));
        let files = workspace.list_dir(absolute_prefix.as_deref())?;

        for path in files.iter() {
            let is_dir = workspace.path().join(path).is_dir();

            if index.is_directly_tracked(path) {
                if is_dir {
                    Box::pin(self.scan_workspace(
                        Some(path),
                        untracked_files,
                        file_stats,
                        index,
                        inspector,
                    ))
                    .await?;
                } else {
                    let stat = workspace.stat_file(path)?;
                    file_stats.insert(path.clone(), stat);
                }
            } else if !inspector.is_indirectly_tracked(path, index)? {
                // untracked directories are reported whole, with a
                // trailing separator
                let path = if is_dir {
                    let mut p = path.clone();
                    p.push("");
                    p
                } else {
                    path.clone()
                };
                untracked_files.insert(path);
            }
        }

        Ok(())
    }

    fn load_head_tree(&self) -> anyhow::Result<HeadTree> {
        let mut head_tree = HeadTree::new();

        let Some(head_oid) = self.repository.refs().read_head()? else {
            return Ok(head_tree);
        };

        if let Some(commit) = self.repository.database().parse_object_as_commit(&head_oid)? {
            flatten_tree(
                self.repository.database(),
                commit.tree_oid(),
                Path::new(""),
                &mut head_tree,
            )?;
        }

        Ok(head_tree)
    }

    fn check_index_entries(
        &self,
        file_stats: &FileStatSet,
        head_tree: &HeadTree,
        index: &mut Index,
        inspector: &Inspector<'_>,
    ) -> anyhow::Result<BTreeMap<PathBuf, FileChange>> {
        let mut changed_files = BTreeMap::<PathBuf, FileChange>::new();
        let index_entries = index.entries().cloned().collect::<Vec<_>>();

        for entry in index_entries {
            self.check_entry_against_workspace(
                &entry,
                file_stats,
                index,
                inspector,
                &mut changed_files,
            )?;

            let head_entry = head_tree.get(&entry.name);
            let verdict = inspector.check_index_against_head_tree(Some(&entry), head_entry);
            if verdict != IndexChangeType::None {
                changed_files.entry(entry.name.clone()).or_default().index_change = verdict;
            }
        }

        Ok(changed_files)
    }

    fn check_entry_against_workspace(
        &self,
        entry: &IndexEntry,
        file_stats: &FileStatSet,
        index: &mut Index,
        inspector: &Inspector<'_>,
        changed_files: &mut BTreeMap<PathBuf, FileChange>,
    ) -> anyhow::Result<()> {
        let stat = file_stats.get(&entry.name);
        let verdict = inspector.check_index_against_workspace(Some(entry), stat)?;

        if verdict != WorkspaceChangeType::None {
            changed_files.entry(entry.name.clone()).or_default().workspace_change = verdict;
        } else if let Some(stat) = stat {
            // content proven unchanged; remember the fresh stat so the
            // next scan can skip the rehash
            index.update_entry_stat(entry, stat.clone());
        }

        Ok(())
    }

    fn collect_deleted_head_files(
        &self,
        head_tree: &HeadTree,
        index: &mut Index,
        changed_files: &mut BTreeMap<PathBuf, FileChange>,
    ) {
        for path in head_tree.keys() {
            if !index.is_directly_tracked(path) {
                changed_files.entry(path.clone()).or_default().index_change =
                    IndexChangeType::Deleted;
            }
        }
    }
}

/// Flatten a tree into (path, entry) pairs, descending into subtrees.
pub fn flatten_tree(
    database: &Database,
    tree_oid: &crate::artifacts::objects::object_id::ObjectId,
    prefix: &Path,
    out: &mut HeadTree,
) -> anyhow::Result<()> {
    let tree = database
        .parse_object_as_tree(tree_oid)?
        .ok_or_else(|| anyhow::anyhow!("object {} does not name a tree", tree_oid))?;

    for (name, entry) in tree.entries() {
        let path = prefix.join(name);
        if entry.is_tree() {
            flatten_tree(database, &entry.oid, &path, out)?;
        } else {
            out.insert(path, entry.clone());
        }
    }

    Ok(())
}
