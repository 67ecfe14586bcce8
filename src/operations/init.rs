use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::BranchName;
use anyhow::Context;
use std::fs;

/// Branch HEAD points at before the first commit exists.
pub const DEFAULT_BRANCH: &str = "master";

impl Repository {
    /// Lay out the repository directory: object store, reference
    /// directories, a HEAD pointing at the (unborn) default branch, and
    /// an empty index. Re-running against an initialized repository is
    /// harmless.
    pub async fn init(&self) -> anyhow::Result<()> {
        fs::create_dir_all(self.database().objects_path())
            .context("failed to create the objects directory")?;

        fs::create_dir_all(self.refs().heads_path())
            .context("failed to create the refs/heads directory")?;

        fs::create_dir_all(self.refs().tags_path())
            .context("failed to create the refs/tags directory")?;

        if !self.refs().head_path().exists() {
            let default_branch = BranchName::try_parse(DEFAULT_BRANCH.to_string())?;
            self.refs()
                .init_head(&default_branch)
                .context("failed to write the initial HEAD reference")?;
        }

        let index = self.index();
        let index = index.lock().await;
        if !index.path().exists() {
            fs::write(index.path(), b"").context("failed to create the index file")?;
        }

        self.set_current_ref(self.refs().current_ref(None)?);

        Ok(())
    }
}
