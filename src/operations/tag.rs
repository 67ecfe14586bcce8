use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::objects::commit::Author;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tag::Tag;
use crate::errors::RepositoryError;

impl Repository {
    /// Create a lightweight tag: a plain reference under `refs/tags`
    /// pointing straight at the target. Nothing enters the object store.
    pub fn tag(&self, name: &str, target: Option<&str>) -> anyhow::Result<ObjectId> {
        let tag_name = BranchName::try_parse(name.to_string())?;
        let target_oid = self.resolve_tag_target(target)?;

        self.refs().create_tag(&tag_name, target_oid.clone())?;

        Ok(target_oid)
    }

    /// Create an annotated tag: a tag object carrying the tagger and
    /// message is stored, and `refs/tags/<name>` points at that object
    /// rather than at the target directly.
    pub fn tag_annotated(
        &self,
        name: &str,
        target: Option<&str>,
        tagger: Author,
        message: &str,
    ) -> anyhow::Result<ObjectId> {
        let tag_name = BranchName::try_parse(name.to_string())?;
        let target_oid = self.resolve_tag_target(target)?;
        let target_type = self.database().get_object_type(&target_oid)?;

        let tag = Tag::new(
            target_oid,
            target_type,
            name.to_string(),
            tagger,
            message.trim().to_string(),
        );
        let tag_oid = self.database().store(&tag)?;

        self.refs().create_tag(&tag_name, tag_oid.clone())?;

        Ok(tag_oid)
    }

    /// Read the annotated tag object behind `refs/tags/<name>`. A
    /// lightweight tag has no object to read and reports `NotFound`.
    pub fn read_tag(&self, name: &str) -> anyhow::Result<Tag> {
        let ref_oid = self.refs().resolve(&format!("refs/tags/{}", name))?;

        self.database()
            .parse_object_as_tag(&ref_oid)?
            .ok_or_else(|| RepositoryError::NotFound(format!("annotated tag {}", name)).into())
    }

    fn resolve_tag_target(&self, target: Option<&str>) -> anyhow::Result<ObjectId> {
        match target {
            Some(revision) => Revision::try_parse(revision)?.resolve(self),
            None => self
                .refs()
                .read_head()?
                .ok_or_else(|| RepositoryError::NotFound("HEAD commit".to_string()).into()),
        }
    }
}
