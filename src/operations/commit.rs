use crate::areas::repository::Repository;
use crate::artifacts::objects::commit::{Author, Commit};
use crate::artifacts::objects::object::Object;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::Tree;

impl Repository {
    /// Turn the staged index into tree objects and a commit, then
    /// advance the current reference to it.
    ///
    /// The reference moves through a single compare-and-swap against the
    /// parent this commit was built on. If another writer advanced the
    /// branch in between, the update surfaces as
    /// [`crate::errors::RepositoryError::Conflict`] rather than silently
    /// reparenting; the commit object itself stays stored and the caller
    /// can rebuild against the new tip.
    pub async fn commit(&self, author: Author, message: &str) -> anyhow::Result<ObjectId> {
        let index = self.index();
        let mut index = index.lock().await;

        index.rehydrate()?;

        if index.is_empty() {
            anyhow::bail!("nothing staged to commit");
        }

        let tree = Tree::build(index.entries())?;
        let store_tree = |subtree: &Tree| self.database().store(subtree).map(|_| ());
        tree.traverse(&store_tree)?;
        let tree_oid = tree.object_id()?;

        let head_ref = self.refs().current_ref(None)?;
        let parent = self.refs().read_oid(&head_ref)?;
        let parents = parent.iter().cloned().collect();

        let commit = Commit::new(parents, tree_oid, author, message.trim().to_string());
        let commit_oid = self.database().store(&commit)?;

        self.refs()
            .compare_and_swap(head_ref.as_ref_path(), parent.as_ref(), Some(&commit_oid))?;

        Ok(commit_oid)
    }
}
