use crate::areas::repository::Repository;
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::diff::tree_diff::ChangeSet;
use crate::artifacts::objects::object_id::ObjectId;

impl Repository {
    /// Path-level changes between two revisions' trees, renames folded
    /// in. Either side may be a branch, tag, or (abbreviated) commit id.
    pub fn diff(&self, old: &str, new: &str) -> anyhow::Result<ChangeSet> {
        let old_oid = Revision::try_parse(old)?.resolve_commit(self)?;
        let new_oid = Revision::try_parse(new)?.resolve_commit(self)?;

        self.diff_trees(Some(&old_oid), Some(&new_oid), true)
    }

    /// Path-level changes between two trees (or commits; the commit's
    /// tree is used). `None` stands for the empty tree. Rename detection
    /// is a separate pass and only runs when asked for.
    pub fn diff_trees(
        &self,
        old: Option<&ObjectId>,
        new: Option<&ObjectId>,
        detect_renames: bool,
    ) -> anyhow::Result<ChangeSet> {
        let mut tree_diff = self.database().tree_diff(old, new)?;

        if detect_renames {
            tree_diff.detect_renames()?;
        }

        Ok(tree_diff.into_changes())
    }
}
