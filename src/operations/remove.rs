use crate::areas::repository::Repository;
use crate::errors::RepositoryError;
use std::path::PathBuf;

impl Repository {
    /// Unstage the given paths. Removal is index-only: the worktree
    /// copies stay where they are and show up as untracked afterwards.
    /// A directory path removes everything staged below it.
    pub async fn remove(&self, paths: &[PathBuf]) -> anyhow::Result<()> {
        let index = self.index();
        let mut index = index.lock().await;

        index.rehydrate()?;

        for path in paths {
            let staged = index.entries_under_path(path);
            if staged.is_empty() {
                return Err(
                    RepositoryError::NotFound(format!("staged path {}", path.display())).into(),
                );
            }

            for staged_path in staged {
                index.remove(staged_path)?;
            }
        }

        index.write_updates()
    }
}
