//! End-to-end exercise of one repository: project history gets built,
//! branched, tagged, diffed, repacked, and checked out again, with every
//! layer crossing through the same store.

mod common;

use pretty_assertions::assert_eq;
use silt::artifacts::diff::tree_diff::TreeChangeType;
use silt::artifacts::graph::rev_walk::WalkOrder;
use std::path::{Path, PathBuf};

#[tokio::test]
async fn a_project_survives_its_whole_first_week() {
    let (_dir, repository) = common::init_repository().await;

    // Day one: a small project lands on master.
    common::write_file(&repository, "README.md", "# silt demo\n");
    common::write_file(&repository, "src/lib.rs", "pub fn answer() -> u32 { 42 }\n");
    common::write_file(&repository, "src/util/mod.rs", "pub mod strings;\n");
    repository
        .add(&[PathBuf::from("README.md"), PathBuf::from("src")])
        .await
        .unwrap();
    let first = repository
        .commit(common::author_at(0), "initial import")
        .await
        .unwrap();

    // Day two: work continues on a feature branch.
    repository.create_branch("feature", None).unwrap();
    repository.checkout("feature").await.unwrap();
    let second =
        common::commit_file(&repository, "src/lib.rs", "pub fn answer() -> u32 { 41 }\n", "tweak the answer", 60).await;

    // Meanwhile the release gets tagged on the spot it was cut from.
    repository.tag("v0.1.0", Some(first.as_ref())).unwrap();
    let annotated = repository
        .tag_annotated(
            "v0.1.0-notes",
            Some(first.as_ref()),
            common::author_at(90),
            "first cut",
        )
        .unwrap();
    assert_ne!(annotated, first); // the tag object has its own identity

    let notes = repository.read_tag("v0.1.0-notes").unwrap();
    assert_eq!(notes.target(), &first);
    assert_eq!(notes.message(), "first cut");

    // A lightweight tag carries no object to read back.
    assert!(repository.read_tag("v0.1.0").is_err());

    // History questions get answered across the branch point.
    assert_eq!(
        repository.merge_base(&first, &second).unwrap(),
        Some(first.clone())
    );
    assert!(repository.is_ancestor(&first, &second).unwrap());
    assert!(!repository.is_ancestor(&second, &first).unwrap());

    let reachable: Vec<_> = repository
        .walk(&[second.clone()], WalkOrder::Topological)
        .unwrap()
        .map(|item| item.unwrap().0)
        .collect();
    assert_eq!(reachable, vec![second.clone(), first.clone()]);

    // The diff across the branch shows exactly the tweak.
    let changes = repository.diff("master", "feature").unwrap();
    assert_eq!(changes.len(), 1);
    assert!(matches!(
        changes[Path::new("src/lib.rs")],
        TreeChangeType::Modified { .. }
    ));

    // Day five: maintenance folds everything into a pack.
    let pack = repository.repack().unwrap().expect("loose objects existed");
    assert!(pack.record_count > 0);
    assert!(repository.database().list_loose_objects().unwrap().is_empty());

    // Every operation keeps working out of the pack tier.
    repository.checkout("master").await.unwrap();
    assert_eq!(
        common::read_file(&repository, "src/lib.rs"),
        "pub fn answer() -> u32 { 42 }\n"
    );

    // Checking out the annotated tag peels it down to the commit.
    repository.checkout("v0.1.0-notes").await.unwrap();
    assert_eq!(repository.refs().read_head().unwrap(), Some(first.clone()));
    assert!(repository.refs().current_ref(None).unwrap().is_detached_head());

    // Back on a branch, nothing was lost along the way.
    repository.checkout("feature").await.unwrap();
    assert_eq!(
        common::read_file(&repository, "src/lib.rs"),
        "pub fn answer() -> u32 { 41 }\n"
    );
    let status = repository.status().await.unwrap();
    assert!(status.changed_files().is_empty());
    assert!(status.untracked_files().is_empty());
}

#[tokio::test]
async fn branch_bookkeeping_tracks_creation_and_deletion() {
    let (_dir, repository) = common::init_repository().await;

    common::commit_file(&repository, "a.txt", "base\n", "base", 0).await;

    repository.create_branch("one", None).unwrap();
    repository.create_branch("two", None).unwrap();

    let names: Vec<String> = repository
        .list_branches()
        .unwrap()
        .into_iter()
        .map(|name| name.to_string())
        .collect();
    assert_eq!(
        names,
        vec!["refs/heads/master", "refs/heads/one", "refs/heads/two"]
    );

    // The checked-out branch refuses to die; the others go quietly.
    assert!(repository.delete_branch("master").is_err());
    repository.delete_branch("two").unwrap();

    let names: Vec<String> = repository
        .list_branches()
        .unwrap()
        .into_iter()
        .map(|name| name.to_string())
        .collect();
    assert_eq!(names, vec!["refs/heads/master", "refs/heads/one"]);
}

#[tokio::test]
async fn concurrent_staging_serializes_on_the_index_lock() {
    let (_dir, repository) = common::init_repository().await;

    common::write_file(&repository, "a.txt", "first\n");
    common::write_file(&repository, "b.txt", "second\n");

    // Both adds contend for the index; whichever loses the lock race must
    // still see and keep the other's entry.
    let paths_a = [PathBuf::from("a.txt")];
    let paths_b = [PathBuf::from("b.txt")];
    let (left, right) = futures::join!(repository.add(&paths_a), repository.add(&paths_b),);
    left.unwrap();
    right.unwrap();

    let tip = repository
        .commit(common::author_at(0), "both staged")
        .await
        .unwrap();

    let changes = repository.diff_trees(None, Some(&tip), false).unwrap();
    assert_eq!(changes.len(), 2);
    assert!(changes.contains_key(Path::new("a.txt")));
    assert!(changes.contains_key(Path::new("b.txt")));
}

#[tokio::test]
async fn committing_nothing_is_refused() {
    let (_dir, repository) = common::init_repository().await;

    let result = repository.commit(common::author_at(0), "empty").await;

    assert!(result.is_err());
}

#[tokio::test]
async fn reinitializing_an_existing_repository_changes_nothing() {
    let (_dir, repository) = common::init_repository().await;

    let tip = common::commit_file(&repository, "a.txt", "content\n", "base", 0).await;

    repository.init().await.unwrap();

    assert_eq!(repository.refs().read_head().unwrap(), Some(tip));
    let status = repository.status().await.unwrap();
    assert!(status.changed_files().is_empty());
}
