//! Worktree migration: switching between branches rewrites the tree,
//! and anything that would lose local work aborts the whole operation
//! before a single file moves.

mod common;

use pretty_assertions::assert_eq;
use silt::{RepositoryError, as_repository_error};
use std::path::PathBuf;

#[tokio::test]
async fn switching_branches_swaps_file_contents() {
    let (_dir, repository) = common::init_repository().await;

    common::commit_file(&repository, "a.txt", "on master\n", "base", 0).await;
    repository.create_branch("topic", None).unwrap();
    repository.checkout("topic").await.unwrap();
    common::commit_file(&repository, "a.txt", "on topic\n", "diverge", 10).await;

    repository.checkout("master").await.unwrap();
    assert_eq!(common::read_file(&repository, "a.txt"), "on master\n");

    repository.checkout("topic").await.unwrap();
    assert_eq!(common::read_file(&repository, "a.txt"), "on topic\n");
}

#[tokio::test]
async fn checkout_creates_and_removes_files_and_directories() {
    let (_dir, repository) = common::init_repository().await;

    common::commit_file(&repository, "keep.txt", "always here\n", "base", 0).await;
    repository.create_branch("topic", None).unwrap();
    repository.checkout("topic").await.unwrap();
    common::commit_file(&repository, "nested/deep/new.txt", "topic only\n", "add nested", 10)
        .await;

    repository.checkout("master").await.unwrap();
    assert!(!common::file_exists(&repository, "nested/deep/new.txt"));
    assert!(!common::file_exists(&repository, "nested"));
    assert!(common::file_exists(&repository, "keep.txt"));

    repository.checkout("topic").await.unwrap();
    assert_eq!(
        common::read_file(&repository, "nested/deep/new.txt"),
        "topic only\n"
    );
}

#[tokio::test]
async fn unstaged_edit_blocks_checkout_and_nothing_moves() {
    let (_dir, repository) = common::init_repository().await;

    common::commit_file(&repository, "a.txt", "original\n", "base", 0).await;
    repository.create_branch("topic", None).unwrap();
    repository.checkout("topic").await.unwrap();
    common::commit_file(&repository, "a.txt", "rewritten\n", "diverge", 10).await;

    // Local edit the migration would clobber.
    common::write_file(&repository, "a.txt", "precious local work\n");

    let error = repository.checkout("master").await.unwrap_err();

    match as_repository_error(&error) {
        Some(RepositoryError::NeedsMerge { conflicts }) => {
            assert_eq!(conflicts, &vec![PathBuf::from("a.txt")]);
        }
        other => panic!("expected NeedsMerge, got {:?}", other),
    }

    // The worktree was left exactly as it was.
    assert_eq!(common::read_file(&repository, "a.txt"), "precious local work\n");

    // And HEAD still points at the branch we were on.
    assert_eq!(
        repository
            .refs()
            .current_ref(None)
            .unwrap()
            .as_ref_path(),
        "refs/heads/topic"
    );
}

#[tokio::test]
async fn untracked_file_in_the_way_blocks_checkout() {
    let (_dir, repository) = common::init_repository().await;

    common::commit_file(&repository, "a.txt", "base\n", "base", 0).await;
    repository.create_branch("topic", None).unwrap();
    repository.checkout("topic").await.unwrap();
    common::commit_file(&repository, "incoming.txt", "from topic\n", "add file", 10).await;

    repository.checkout("master").await.unwrap();

    // An untracked file now sits where the topic branch wants to put one.
    common::write_file(&repository, "incoming.txt", "unrelated scribbles\n");

    let error = repository.checkout("topic").await.unwrap_err();

    match as_repository_error(&error) {
        Some(RepositoryError::NeedsMerge { conflicts }) => {
            assert_eq!(conflicts, &vec![PathBuf::from("incoming.txt")]);
        }
        other => panic!("expected NeedsMerge, got {:?}", other),
    }

    assert_eq!(
        common::read_file(&repository, "incoming.txt"),
        "unrelated scribbles\n"
    );
}

#[tokio::test]
async fn blocked_checkout_reports_every_conflicting_path_sorted() {
    let (_dir, repository) = common::init_repository().await;

    common::write_file(&repository, "a.txt", "one\n");
    common::write_file(&repository, "b.txt", "two\n");
    repository
        .add(&[PathBuf::from("a.txt"), PathBuf::from("b.txt")])
        .await
        .unwrap();
    repository.commit(common::author_at(0), "base").await.unwrap();

    repository.create_branch("topic", None).unwrap();
    repository.checkout("topic").await.unwrap();
    common::write_file(&repository, "a.txt", "one topic\n");
    common::write_file(&repository, "b.txt", "two topic\n");
    repository
        .add(&[PathBuf::from("a.txt"), PathBuf::from("b.txt")])
        .await
        .unwrap();
    repository.commit(common::author_at(10), "diverge").await.unwrap();

    common::write_file(&repository, "b.txt", "dirty b\n");
    common::write_file(&repository, "a.txt", "dirty a\n");

    let error = repository.checkout("master").await.unwrap_err();

    match as_repository_error(&error) {
        Some(RepositoryError::NeedsMerge { conflicts }) => {
            assert_eq!(
                conflicts,
                &vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]
            );
        }
        other => panic!("expected NeedsMerge, got {:?}", other),
    }
}

#[tokio::test]
async fn checkout_by_commit_id_detaches_head() {
    let (_dir, repository) = common::init_repository().await;

    let first = common::commit_file(&repository, "a.txt", "one\n", "first", 0).await;
    common::commit_file(&repository, "a.txt", "two\n", "second", 10).await;

    repository.checkout(first.as_ref()).await.unwrap();

    assert_eq!(common::read_file(&repository, "a.txt"), "one\n");
    assert_eq!(repository.refs().read_head().unwrap(), Some(first.clone()));
    assert!(repository.refs().current_ref(None).unwrap().is_detached_head());
}

#[tokio::test]
async fn checkout_of_the_current_tree_is_harmless() {
    let (_dir, repository) = common::init_repository().await;

    common::commit_file(&repository, "a.txt", "stable\n", "base", 0).await;

    repository.checkout("master").await.unwrap();

    assert_eq!(common::read_file(&repository, "a.txt"), "stable\n");
    assert_eq!(
        repository.refs().current_ref(None).unwrap().as_ref_path(),
        "refs/heads/master"
    );
}

#[tokio::test]
async fn locally_deleted_file_does_not_block_a_checkout_that_deletes_it() {
    let (_dir, repository) = common::init_repository().await;

    common::commit_file(&repository, "a.txt", "committed\n", "base", 0).await;
    repository.create_branch("topic", None).unwrap();
    repository.checkout("topic").await.unwrap();
    common::commit_file(&repository, "b.txt", "other\n", "topic work", 10).await;

    // The target tree wants b.txt gone and so does the worktree; there is
    // no local content left to lose.
    std::fs::remove_file(repository.path().join("b.txt")).unwrap();

    repository.checkout("master").await.unwrap();

    assert!(!common::file_exists(&repository, "b.txt"));
    assert_eq!(common::read_file(&repository, "a.txt"), "committed\n");
}
