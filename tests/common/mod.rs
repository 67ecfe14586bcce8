#![allow(dead_code)]

use assert_fs::TempDir;
use fake::Fake;
use fake::faker::lorem::en::Words;
use silt::Repository;
use silt::artifacts::objects::commit::Author;
use silt::artifacts::objects::object_id::ObjectId;
use std::path::Path;

/// Fixed instant test history is anchored at, so commit ordering in
/// assertions never depends on the wall clock.
pub fn base_time() -> chrono::DateTime<chrono::FixedOffset> {
    chrono::DateTime::parse_from_rfc3339("2024-03-01T12:00:00+00:00").unwrap()
}

/// Deterministic identity stamped `seconds` after [`base_time`].
pub fn author_at(seconds: i64) -> Author {
    Author::new_with_timestamp(
        "Ada Lovelace".to_string(),
        "ada@example.com".to_string(),
        base_time() + chrono::Duration::seconds(seconds),
    )
}

/// Fresh repository in a temp directory, already initialized. Routes
/// engine tracing through the test harness; `RUST_LOG` controls what
/// shows when a test fails.
pub async fn init_repository() -> (TempDir, Repository) {
    static TRACING: std::sync::Once = std::sync::Once::new();
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });

    let dir = TempDir::new().unwrap();
    let repository = Repository::new(dir.path().to_str().unwrap()).unwrap();
    repository.init().await.unwrap();

    (dir, repository)
}

/// Write a worktree file, creating parent directories as needed.
pub fn write_file(repository: &Repository, path: &str, content: &str) {
    let full_path = repository.path().join(path);
    if let Some(parent) = full_path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(full_path, content).unwrap();
}

pub fn read_file(repository: &Repository, path: &str) -> String {
    std::fs::read_to_string(repository.path().join(path)).unwrap()
}

pub fn file_exists(repository: &Repository, path: &str) -> bool {
    repository.path().join(path).exists()
}

/// Write, stage, and commit one file at a deterministic timestamp.
pub async fn commit_file(
    repository: &Repository,
    path: &str,
    content: &str,
    message: &str,
    seconds: i64,
) -> ObjectId {
    write_file(repository, path, content);
    repository.add(&[Path::new(path).to_path_buf()]).await.unwrap();
    repository.commit(author_at(seconds), message).await.unwrap()
}

/// A handful of random words, for content that should not collide.
pub fn lorem() -> String {
    Words(5..10).fake::<Vec<String>>().join(" ")
}
