use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::{BranchName, SymRefName};
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::RepositoryError;

impl Repository {
    /// Create a branch anchored at `from` (a revision expression), or at
    /// the current HEAD when `from` is `None`. Only commits may anchor a
    /// branch; annotated tags are peeled on the way.
    pub fn create_branch(&self, name: &str, from: Option<&str>) -> anyhow::Result<ObjectId> {
        let branch_name = BranchName::try_parse(name.to_string())?;

        let source_oid = match from {
            Some(revision) => Revision::try_parse(revision)?.resolve_commit(self)?,
            None => self
                .refs()
                .read_head()?
                .ok_or_else(|| RepositoryError::NotFound("HEAD commit".to_string()))?,
        };

        self.refs().create_branch(&branch_name, source_oid.clone())?;

        Ok(source_oid)
    }

    /// Delete a branch, returning the tip it pointed at. The currently
    /// checked-out branch cannot be deleted.
    pub fn delete_branch(&self, name: &str) -> anyhow::Result<ObjectId> {
        let branch_name = BranchName::try_parse(name.to_string())?;

        if self.refs().is_current_branch(&branch_name)? {
            anyhow::bail!("cannot delete the checked-out branch {}", branch_name);
        }

        self.refs().delete_branch(&branch_name)
    }

    pub fn list_branches(&self) -> anyhow::Result<Vec<SymRefName>> {
        self.refs().list_branches()
    }
}
