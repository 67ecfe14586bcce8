use crate::areas::repository::Repository;
use crate::areas::workspace::WorktreeLock;
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::checkout::migration::Migration;

impl Repository {
    /// Switch the worktree and index to the tree of `target` (a branch,
    /// tag, or commit id) and repoint HEAD at it.
    ///
    /// All-or-nothing: when any local change would be lost the operation
    /// fails with [`crate::errors::RepositoryError::NeedsMerge`] listing
    /// every blocked path, and neither the worktree nor the index has
    /// been modified. The worktree lock is held for the whole mutation
    /// so concurrent tooling never observes a half-switched tree.
    pub async fn checkout(&self, target: &str) -> anyhow::Result<()> {
        let revision = Revision::try_parse(target)?;
        let target_oid = revision.resolve_commit(self)?;
        let current_oid = self.refs().read_head()?;

        let index = self.index();
        let mut index = index.lock().await;

        index.rehydrate()?;

        let _worktree_lock = WorktreeLock::acquire(self.git_path())?;

        let tree_diff = self
            .database()
            .tree_diff(current_oid.as_ref(), Some(&target_oid))?;

        let mut migration = Migration::new(self, &mut index, tree_diff);
        migration.apply_changes()?;

        index.write_updates()?;

        self.refs().set_head(target, target_oid.as_ref().into())?;
        self.set_current_ref(self.refs().current_ref(None)?);

        Ok(())
    }
}
