//! Rename detection
//!
//! A rename shows up in a raw tree diff as an unrelated deletion and
//! addition. This pass pairs them back up: deleted and added blobs are
//! scored by content similarity, the best-scoring pairs are matched
//! greedily, and each match collapses into one `Renamed` record keyed by
//! the new path.
//!
//! Similarity is the Dice coefficient over line hash multisets: twice
//! the number of shared lines divided by the total line count of both
//! sides. Identical content scores 1.0 without loading anything, since
//! equal blobs share an id.

use crate::areas::database::Database;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::tree_diff::{ChangeSet, TreeChangeType};
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use tracing::debug;

/// Minimum similarity for a deleted/added pair to count as a rename.
pub const RENAME_THRESHOLD: f64 = 0.5;

type LineCounts = HashMap<u64, usize>;

pub(crate) fn detect_renames(database: &Database, changes: &mut ChangeSet) -> anyhow::Result<()> {
    let mut deleted = Vec::new();
    let mut added = Vec::new();

    for (path, change) in changes.iter() {
        match change {
            TreeChangeType::Deleted(entry) => {
                let lines = load_line_counts(database, entry)?;
                deleted.push((path.clone(), entry.clone(), lines));
            }
            TreeChangeType::Added(entry) => {
                let lines = load_line_counts(database, entry)?;
                added.push((path.clone(), entry.clone(), lines));
            }
            _ => {}
        }
    }

    if deleted.is_empty() || added.is_empty() {
        return Ok(());
    }

    // Score every pairing above the threshold, then match greedily from
    // the top. Ties break on path order so detection is deterministic.
    let mut candidates = Vec::new();
    for (deleted_index, (_, old_entry, old_lines)) in deleted.iter().enumerate() {
        for (added_index, (_, new_entry, new_lines)) in added.iter().enumerate() {
            let similarity = if old_entry.oid == new_entry.oid {
                1.0
            } else {
                dice_coefficient(old_lines, new_lines)
            };

            if similarity >= RENAME_THRESHOLD {
                candidates.push((similarity, deleted_index, added_index));
            }
        }
    }

    candidates.sort_by(|a, b| {
        b.0.total_cmp(&a.0)
            .then_with(|| deleted[a.1].0.cmp(&deleted[b.1].0))
            .then_with(|| added[a.2].0.cmp(&added[b.2].0))
    });

    let mut matched_deleted = HashSet::new();
    let mut matched_added = HashSet::new();
    let mut renames: Vec<(PathBuf, PathBuf, DatabaseEntry, DatabaseEntry)> = Vec::new();

    for (similarity, deleted_index, added_index) in candidates {
        if matched_deleted.contains(&deleted_index) || matched_added.contains(&added_index) {
            continue;
        }
        matched_deleted.insert(deleted_index);
        matched_added.insert(added_index);

        let (from, old_entry, _) = &deleted[deleted_index];
        let (to, new_entry, _) = &added[added_index];
        debug!(
            from = %from.display(),
            to = %to.display(),
            similarity,
            "rename detected"
        );
        renames.push((
            from.clone(),
            to.clone(),
            old_entry.clone(),
            new_entry.clone(),
        ));
    }

    for (from, to, old, new) in renames {
        changes.remove(&from);
        changes.insert(to, TreeChangeType::Renamed { from, old, new });
    }

    Ok(())
}

fn load_line_counts(database: &Database, entry: &DatabaseEntry) -> anyhow::Result<LineCounts> {
    let (_, content) = database.load(&entry.oid)?;
    Ok(line_counts(&content))
}

fn line_counts(content: &[u8]) -> LineCounts {
    let mut counts = LineCounts::new();
    // A trailing newline is a terminator, not an extra shared empty line.
    let content = content.strip_suffix(b"\n").unwrap_or(content);
    for line in content.split(|byte| *byte == b'\n') {
        let mut hasher = DefaultHasher::new();
        line.hash(&mut hasher);
        *counts.entry(hasher.finish()).or_insert(0) += 1;
    }
    counts
}

/// `2 * shared / (len(a) + len(b))` over line multisets. Both sides
/// always contain at least one line (splitting empty content yields one
/// empty line), so the denominator is never zero.
fn dice_coefficient(old_lines: &LineCounts, new_lines: &LineCounts) -> f64 {
    let total = old_lines.values().sum::<usize>() + new_lines.values().sum::<usize>();

    let mut shared = 0usize;
    for (hash, count) in old_lines {
        if let Some(other) = new_lines.get(hash) {
            shared += *count.min(other);
        }
    }

    2.0 * shared as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
    use crate::artifacts::objects::object_type::ObjectType;
    use assert_fs::TempDir;
    use rstest::rstest;
    use std::path::Path;

    fn regular(oid: &crate::artifacts::objects::object_id::ObjectId) -> DatabaseEntry {
        DatabaseEntry::new(oid.clone(), EntryMode::File(FileMode::Regular))
    }

    #[rstest]
    fn identical_content_under_a_new_path_becomes_a_rename() {
        let dir = TempDir::new().unwrap();
        let database = Database::new(dir.path().join("objects").into_boxed_path());
        let oid = database.put(ObjectType::Blob, b"fn main() {}\n").unwrap();

        let mut changes = ChangeSet::new();
        changes.insert(
            PathBuf::from("old.rs"),
            TreeChangeType::Deleted(regular(&oid)),
        );
        changes.insert(PathBuf::from("new.rs"), TreeChangeType::Added(regular(&oid)));

        detect_renames(&database, &mut changes).unwrap();

        assert_eq!(changes.len(), 1);
        match changes.get(Path::new("new.rs")) {
            Some(TreeChangeType::Renamed { from, .. }) => {
                assert_eq!(from, Path::new("old.rs"));
            }
            other => panic!("expected a rename, got {:?}", other),
        }
    }

    #[rstest]
    fn similar_content_above_the_threshold_pairs_up() {
        let dir = TempDir::new().unwrap();
        let database = Database::new(dir.path().join("objects").into_boxed_path());

        let old = database
            .put(ObjectType::Blob, b"one\ntwo\nthree\nfour\n")
            .unwrap();
        let new = database
            .put(ObjectType::Blob, b"one\ntwo\nthree\nfive\n")
            .unwrap();

        let mut changes = ChangeSet::new();
        changes.insert(PathBuf::from("a.txt"), TreeChangeType::Deleted(regular(&old)));
        changes.insert(PathBuf::from("b.txt"), TreeChangeType::Added(regular(&new)));

        detect_renames(&database, &mut changes).unwrap();

        assert!(matches!(
            changes.get(Path::new("b.txt")),
            Some(TreeChangeType::Renamed { .. })
        ));
        assert!(!changes.contains_key(Path::new("a.txt")));
    }

    #[rstest]
    fn dissimilar_content_stays_a_delete_plus_add() {
        let dir = TempDir::new().unwrap();
        let database = Database::new(dir.path().join("objects").into_boxed_path());

        let old = database
            .put(ObjectType::Blob, b"alpha\nbeta\ngamma\ndelta\n")
            .unwrap();
        let new = database
            .put(ObjectType::Blob, b"epsilon\nzeta\neta\ntheta\n")
            .unwrap();

        let mut changes = ChangeSet::new();
        changes.insert(PathBuf::from("a.txt"), TreeChangeType::Deleted(regular(&old)));
        changes.insert(PathBuf::from("b.txt"), TreeChangeType::Added(regular(&new)));

        detect_renames(&database, &mut changes).unwrap();

        assert!(matches!(
            changes.get(Path::new("a.txt")),
            Some(TreeChangeType::Deleted(_))
        ));
        assert!(matches!(
            changes.get(Path::new("b.txt")),
            Some(TreeChangeType::Added(_))
        ));
    }

    #[rstest]
    fn each_deleted_entry_matches_at_most_one_added_entry() {
        let dir = TempDir::new().unwrap();
        let database = Database::new(dir.path().join("objects").into_boxed_path());
        let oid = database.put(ObjectType::Blob, b"shared\ncontent\n").unwrap();

        let mut changes = ChangeSet::new();
        changes.insert(PathBuf::from("gone.txt"), TreeChangeType::Deleted(regular(&oid)));
        changes.insert(PathBuf::from("copy1.txt"), TreeChangeType::Added(regular(&oid)));
        changes.insert(PathBuf::from("copy2.txt"), TreeChangeType::Added(regular(&oid)));

        detect_renames(&database, &mut changes).unwrap();

        // The first added path in order wins; the other stays an addition.
        assert!(matches!(
            changes.get(Path::new("copy1.txt")),
            Some(TreeChangeType::Renamed { .. })
        ));
        assert!(matches!(
            changes.get(Path::new("copy2.txt")),
            Some(TreeChangeType::Added(_))
        ));
        assert!(!changes.contains_key(Path::new("gone.txt")));
    }
}
