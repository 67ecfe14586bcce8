//! Change classification for tracked paths
//!
//! A tracked path is compared along two edges: index against the
//! worktree, and index against the HEAD tree. The pair of verdicts is a
//! [`FileChange`]; [`PathState`] collapses that pair into the lifecycle
//! position of the path.

/// Verdict of comparing an index entry against the worktree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum WorkspaceChangeType {
    #[default]
    None,
    Untracked,
    Modified,
    Deleted,
}

/// Verdict of comparing an index entry against the HEAD tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum IndexChangeType {
    #[default]
    None,
    Added,
    Modified,
    Deleted,
}

/// Both verdicts for one path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct FileChange {
    pub workspace_change: WorkspaceChangeType,
    pub index_change: IndexChangeType,
}

impl FileChange {
    /// Two-letter short form, index column first (`"A "`, `" M"`, ...).
    pub fn short_code(&self) -> String {
        let index = match self.index_change {
            IndexChangeType::None => ' ',
            IndexChangeType::Added => 'A',
            IndexChangeType::Modified => 'M',
            IndexChangeType::Deleted => 'D',
        };
        let workspace = match self.workspace_change {
            WorkspaceChangeType::None => ' ',
            WorkspaceChangeType::Untracked => '?',
            WorkspaceChangeType::Modified => 'M',
            WorkspaceChangeType::Deleted => 'D',
        };

        format!("{}{}", index, workspace)
    }
}

/// Where a path currently sits in its tracked lifecycle.
///
/// `Staged` covers both a path staged for the first time and a modified
/// path staged again; `Removed` means the index no longer carries a path
/// the current commit still has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    Untracked,
    Staged,
    Unmodified,
    Modified,
    Removed,
}

impl From<&FileChange> for PathState {
    fn from(change: &FileChange) -> Self {
        match (&change.index_change, &change.workspace_change) {
            (IndexChangeType::Deleted, _) => PathState::Removed,
            (IndexChangeType::Added | IndexChangeType::Modified, WorkspaceChangeType::None) => {
                PathState::Staged
            }
            // Staged and then touched again: the worktree verdict wins.
            (_, WorkspaceChangeType::Modified | WorkspaceChangeType::Deleted) => {
                PathState::Modified
            }
            (_, WorkspaceChangeType::Untracked) => PathState::Untracked,
            (IndexChangeType::None, WorkspaceChangeType::None) => PathState::Unmodified,
        }
    }
}
