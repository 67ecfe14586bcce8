//! Tree-to-tree change sets between commits: adds, deletes, edits, and
//! content-similarity rename folding.

mod common;

use pretty_assertions::assert_eq;
use silt::artifacts::diff::tree_diff::TreeChangeType;
use std::path::{Path, PathBuf};

const ESSAY: &str = "line one of a reasonably long file\n\
    line two of a reasonably long file\n\
    line three of a reasonably long file\n\
    line four of a reasonably long file\n";

#[tokio::test]
async fn edits_additions_and_deletions_are_classified_per_path() {
    let (_dir, repository) = common::init_repository().await;

    common::write_file(&repository, "kept.txt", "unchanged\n");
    common::write_file(&repository, "edited.txt", "before\n");
    common::write_file(&repository, "doomed.txt", "short lived\n");
    repository
        .add(&[
            PathBuf::from("kept.txt"),
            PathBuf::from("edited.txt"),
            PathBuf::from("doomed.txt"),
        ])
        .await
        .unwrap();
    let old = repository.commit(common::author_at(0), "old state").await.unwrap();

    common::write_file(&repository, "edited.txt", "after\n");
    common::write_file(&repository, "fresh.txt", "brand new\n");
    repository.remove(&[PathBuf::from("doomed.txt")]).await.unwrap();
    repository
        .add(&[PathBuf::from("edited.txt"), PathBuf::from("fresh.txt")])
        .await
        .unwrap();
    let new = repository.commit(common::author_at(10), "new state").await.unwrap();

    let changes = repository.diff(old.as_ref(), new.as_ref()).unwrap();

    assert_eq!(changes.len(), 3);
    assert!(!changes.contains_key(Path::new("kept.txt")));
    assert!(matches!(
        changes[Path::new("edited.txt")],
        TreeChangeType::Modified { .. }
    ));
    assert!(matches!(
        changes[Path::new("fresh.txt")],
        TreeChangeType::Added(_)
    ));
    assert!(matches!(
        changes[Path::new("doomed.txt")],
        TreeChangeType::Deleted(_)
    ));
}

#[tokio::test]
async fn moved_content_is_folded_into_a_rename() {
    let (_dir, repository) = common::init_repository().await;

    common::commit_file(&repository, "old_name.txt", ESSAY, "original", 0).await;

    common::write_file(&repository, "new_name.txt", ESSAY);
    repository.add(&[PathBuf::from("new_name.txt")]).await.unwrap();
    repository.remove(&[PathBuf::from("old_name.txt")]).await.unwrap();
    let moved = repository.commit(common::author_at(10), "move it").await.unwrap();

    let parent = repository
        .database()
        .parse_object_as_commit(&moved)
        .unwrap()
        .unwrap()
        .parent()
        .cloned()
        .unwrap();

    let changes = repository.diff(parent.as_ref(), moved.as_ref()).unwrap();

    assert_eq!(changes.len(), 1);
    match &changes[Path::new("new_name.txt")] {
        TreeChangeType::Renamed { from, .. } => {
            assert_eq!(from, Path::new("old_name.txt"));
        }
        other => panic!("expected Renamed, got {:?}", other),
    }
}

#[tokio::test]
async fn dissimilar_content_stays_a_separate_add_and_delete() {
    let (_dir, repository) = common::init_repository().await;

    let first = common::commit_file(
        &repository,
        "old_name.txt",
        "nothing like the replacement at all\n",
        "original",
        0,
    )
    .await;

    common::write_file(&repository, "new_name.txt", ESSAY);
    repository.add(&[PathBuf::from("new_name.txt")]).await.unwrap();
    repository.remove(&[PathBuf::from("old_name.txt")]).await.unwrap();
    let second = repository.commit(common::author_at(10), "replace").await.unwrap();

    let changes = repository.diff(first.as_ref(), second.as_ref()).unwrap();

    assert_eq!(changes.len(), 2);
    assert!(matches!(
        changes[Path::new("new_name.txt")],
        TreeChangeType::Added(_)
    ));
    assert!(matches!(
        changes[Path::new("old_name.txt")],
        TreeChangeType::Deleted(_)
    ));
}

#[tokio::test]
async fn diff_against_the_empty_tree_reports_everything_added() {
    let (_dir, repository) = common::init_repository().await;

    let tip = common::commit_file(&repository, "nested/file.txt", "content\n", "base", 0).await;

    let changes = repository.diff_trees(None, Some(&tip), false).unwrap();

    assert_eq!(changes.len(), 1);
    assert!(matches!(
        changes[Path::new("nested/file.txt")],
        TreeChangeType::Added(_)
    ));
}

#[tokio::test]
async fn branch_names_resolve_on_both_sides_of_a_diff() {
    let (_dir, repository) = common::init_repository().await;

    common::commit_file(&repository, "a.txt", "master content\n", "base", 0).await;
    repository.create_branch("topic", None).unwrap();
    repository.checkout("topic").await.unwrap();
    common::commit_file(&repository, "a.txt", "topic content\n", "diverge", 10).await;

    let changes = repository.diff("master", "topic").unwrap();

    assert_eq!(changes.len(), 1);
    assert!(matches!(
        changes[Path::new("a.txt")],
        TreeChangeType::Modified { .. }
    ));
}
