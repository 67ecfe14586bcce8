//! Worktree migration planning and execution
//!
//! Checking out a tree happens in two strictly separated phases:
//!
//! 1. **Plan**: walk the tree diff, classify each change as an add,
//!    delete or modify, and probe the index and worktree for anything
//!    the change would clobber.
//! 2. **Apply**: only when planning found no conflicts, push the planned
//!    actions through the workspace and rewrite the index to match.
//!
//! A plan with conflicts aborts with [`RepositoryError::NeedsMerge`]
//! carrying every blocked path; neither the worktree nor the index has
//! been touched at that point, so the caller can retry after committing
//! or discarding.

use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::checkout::conflict::ConflictType;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::tree_diff::{TreeChangeType, TreeDiff};
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::status::file_change::{IndexChangeType, WorkspaceChangeType};
use crate::artifacts::status::inspector::Inspector;
use crate::errors::RepositoryError;
use anyhow::Context;
use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Kind of filesystem action a planned change needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionType {
    Add,
    Delete,
    Modify,
}

/// Planned actions grouped by kind.
pub type ActionsSet = HashMap<ActionType, Vec<(PathBuf, Option<DatabaseEntry>)>>;

/// Blocked paths grouped by why they are blocked.
pub type ConflictsSet = HashMap<ConflictType, Vec<PathBuf>>;

/// Plans and executes the switch from the current tree to a target tree.
pub struct Migration<'r> {
    repository: &'r Repository,
    /// Diff between the current and the target tree
    tree_diff: TreeDiff<'r>,
    /// Index rewritten alongside the worktree
    index: &'r mut Index,
    inspector: Inspector<'r>,
    actions: ActionsSet,
    conflicts: ConflictsSet,
    /// Directories to create, shallowest first
    mkdirs: BTreeSet<PathBuf>,
    /// Directories to remove once emptied
    rmdirs: BTreeSet<PathBuf>,
}

impl<'r> Migration<'r> {
    pub fn new(repository: &'r Repository, index: &'r mut Index, tree_diff: TreeDiff<'r>) -> Self {
        let actions = HashMap::from([
            (ActionType::Add, Vec::new()),
            (ActionType::Delete, Vec::new()),
            (ActionType::Modify, Vec::new()),
        ]);

        let conflicts = HashMap::from([
            (ConflictType::StaleFile, Vec::new()),
            (ConflictType::StaleDirectory, Vec::new()),
            (ConflictType::UntrackedOverwritten, Vec::new()),
            (ConflictType::UntrackedRemoved, Vec::new()),
        ]);

        let inspector = Inspector::new(repository);

        Self {
            repository,
            index,
            tree_diff,
            inspector,
            actions,
            conflicts,
            mkdirs: BTreeSet::new(),
            rmdirs: BTreeSet::new(),
        }
    }

    pub fn actions(&self) -> &ActionsSet {
        &self.actions
    }

    pub fn mkdirs(&self) -> &BTreeSet<PathBuf> {
        &self.mkdirs
    }

    pub fn rmdirs(&self) -> &BTreeSet<PathBuf> {
        &self.rmdirs
    }

    /// Plan, then apply. All-or-nothing: a conflicted plan returns
    /// [`RepositoryError::NeedsMerge`] before anything is written.
    pub fn apply_changes(&mut self) -> anyhow::Result<()> {
        self.plan_changes()?;
        self.update_workspace()?;
        self.update_index()?;

        Ok(())
    }

    fn plan_changes(&mut self) -> anyhow::Result<()> {
        let changes: Vec<(PathBuf, TreeChangeType)> = self
            .tree_diff
            .changes()
            .iter()
            .map(|(path, change)| (path.clone(), change.clone()))
            .collect();

        for (path, change) in &changes {
            self.check_for_conflict(path, change)?;
            self.record_change(path, change);
        }

        let mut blocked: Vec<PathBuf> = Vec::new();
        for (conflict_type, paths) in &self.conflicts {
            if !paths.is_empty() {
                debug!(
                    kind = conflict_type.describe(),
                    count = paths.len(),
                    "checkout blocked"
                );
                blocked.extend(paths.iter().cloned());
            }
        }

        if !blocked.is_empty() {
            blocked.sort();
            blocked.dedup();
            return Err(RepositoryError::NeedsMerge { conflicts: blocked }.into());
        }

        Ok(())
    }

    fn check_for_conflict(&mut self, path: &Path, change: &TreeChangeType) -> anyhow::Result<()> {
        let entry = self.index.entry_by_path(path);

        let (old_entry, new_entry) = match change {
            TreeChangeType::Added(new_entry) => (None, Some(new_entry)),
            TreeChangeType::Deleted(old_entry) => (Some(old_entry), None),
            TreeChangeType::Modified { old, new } => (Some(old), Some(new)),
            TreeChangeType::Renamed { old, new, .. } => (Some(old), Some(new)),
        };

        if self.index_differs_from_trees(entry, old_entry, new_entry)? {
            self.conflicts
                .entry(ConflictType::StaleFile)
                .or_default()
                .push(path.into());

            return Ok(());
        }

        let stat = self.repository.workspace().stat_file(path).ok();
        let stat = stat.as_ref();
        let conflict_type = ConflictType::get_conflict_type(stat, entry, new_entry);

        match stat {
            Some(stat) if stat.mode.is_tree() => {
                if self.inspector.is_indirectly_tracked(path, self.index)? {
                    self.conflicts
                        .entry(conflict_type)
                        .or_default()
                        .push(path.into());
                }
            }
            Some(_) => {
                if self.inspector.check_index_against_workspace(entry, stat)?
                    != WorkspaceChangeType::None
                {
                    self.conflicts
                        .entry(conflict_type)
                        .or_default()
                        .push(path.into());
                }
            }
            None => {
                if let Some(parent) = self.untracked_parent(path) {
                    self.conflicts
                        .entry(conflict_type)
                        .or_default()
                        .push(if entry.is_some() {
                            path.into()
                        } else {
                            parent.into()
                        });
                }
            }
        }

        Ok(())
    }

    /// Nearest ancestor that exists as an untracked regular file, which
    /// would have to be destroyed to make room for `path`.
    fn untracked_parent<'p>(&self, path: &'p Path) -> Option<&'p Path> {
        path.parent()?.ancestors().find(|parent| {
            if parent.as_os_str() == "." || parent.as_os_str().is_empty() {
                return false;
            }

            match self.repository.workspace().stat_file(parent) {
                Ok(parent_stat) if parent_stat.mode.is_tree() => false,
                Ok(_) => self
                    .inspector
                    .is_indirectly_tracked(parent, self.index)
                    .unwrap_or_default(),
                _ => false,
            }
        })
    }

    /// The index disagrees with both sides of the change, meaning it
    /// holds staged state this migration did not produce and would not
    /// reproduce.
    fn index_differs_from_trees(
        &self,
        index_entry: Option<&IndexEntry>,
        old_entry: Option<&DatabaseEntry>,
        new_entry: Option<&DatabaseEntry>,
    ) -> anyhow::Result<bool> {
        Ok(self
            .inspector
            .check_index_against_head_tree(index_entry, old_entry)
            != IndexChangeType::None
            && self
                .inspector
                .check_index_against_head_tree(index_entry, new_entry)
                != IndexChangeType::None)
    }

    fn record_change(&mut self, path: &Path, change: &TreeChangeType) {
        match change {
            TreeChangeType::Added(new_entry) => {
                self.record_parent_dirs(path, false);
                self.actions
                    .entry(ActionType::Add)
                    .or_default()
                    .push((path.into(), Some(new_entry.clone())));
            }
            TreeChangeType::Deleted(_) => {
                self.record_parent_dirs(path, true);
                self.actions
                    .entry(ActionType::Delete)
                    .or_default()
                    .push((path.into(), None));
            }
            TreeChangeType::Modified { new, .. } | TreeChangeType::Renamed { new, .. } => {
                self.record_parent_dirs(path, false);
                self.actions
                    .entry(ActionType::Modify)
                    .or_default()
                    .push((path.into(), Some(new.clone())));
            }
        }
    }

    fn record_parent_dirs(&mut self, path: &Path, removal: bool) {
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            if removal {
                self.rmdirs.insert(ancestor.to_path_buf());
            } else {
                self.mkdirs.insert(ancestor.to_path_buf());
            }
        }
    }

    fn update_workspace(&self) -> anyhow::Result<()> {
        self.repository.workspace().apply_migration(self)
    }

    fn update_index(&mut self) -> anyhow::Result<()> {
        for (path, _) in self.actions[&ActionType::Delete].clone() {
            self.index.remove(path)?;
        }

        for action_type in [ActionType::Add, ActionType::Modify] {
            for (path, entry) in self.actions[&action_type].clone() {
                let entry = entry
                    .with_context(|| format!("planned {:?} for {:?} lost its entry", action_type, path))?;
                let stat = self.repository.workspace().stat_file(&path)?;
                self.index.add(IndexEntry::new(path, entry.oid, stat))?;
            }
        }

        Ok(())
    }

    /// Blob payload for a planned write, straight from the database.
    pub fn load_blob_data(&self, object_id: &ObjectId) -> anyhow::Result<Bytes> {
        let blob = self
            .repository
            .database()
            .parse_object_as_blob(object_id)?
            .with_context(|| format!("object {} is not a blob", object_id))?;

        Ok(blob.content().clone())
    }
}
