use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};

/// Why a planned change cannot be applied without losing local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictType {
    /// The index entry carries changes the target tree does not have
    StaleFile,
    /// A directory stands where the target tree wants something else
    StaleDirectory,
    /// An untracked file sits at a path the target tree writes to
    UntrackedOverwritten,
    /// An untracked file would vanish with its directory
    UntrackedRemoved,
}

impl ConflictType {
    /// Short label for logging; the structured error carries the paths.
    pub fn describe(&self) -> &'static str {
        match self {
            ConflictType::StaleFile => "local changes would be overwritten",
            ConflictType::StaleDirectory => "directory holds untracked files",
            ConflictType::UntrackedOverwritten => "untracked file would be overwritten",
            ConflictType::UntrackedRemoved => "untracked file would be removed",
        }
    }

    /// Classify a blocked path from what sits there now and what the
    /// migration wants to put there.
    pub fn get_conflict_type(
        stat: Option<&EntryMetadata>,
        entry: Option<&IndexEntry>,
        new_entry: Option<&DatabaseEntry>,
    ) -> ConflictType {
        if entry.is_some() {
            ConflictType::StaleFile
        } else if let Some(stat) = stat
            && stat.mode.is_tree()
        {
            ConflictType::StaleDirectory
        } else if new_entry.is_some() {
            ConflictType::UntrackedOverwritten
        } else {
            ConflictType::UntrackedRemoved
        }
    }
}
