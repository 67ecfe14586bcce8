use crate::areas::repository::Repository;
use crate::artifacts::branch::REF_ALIASES;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::objects::OBJECT_ID_LENGTH;
use crate::artifacts::objects::object::ObjectBox;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::RepositoryError;

/// A target expression an operation accepts: a reference name (branch,
/// tag, `HEAD`, or the `@` alias for it) or a full or abbreviated object
/// id. References win when a name could be read either way, so a branch
/// named `cafe` shadows objects whose ids start with `cafe`.
#[derive(Debug, Clone)]
pub struct Revision(BranchName);

impl Revision {
    pub fn try_parse(revision: &str) -> anyhow::Result<Revision> {
        let resolved_name = *REF_ALIASES.get(revision).unwrap_or(&revision);
        let name = BranchName::try_parse(resolved_name.to_string())?;
        Ok(Revision(name))
    }

    pub fn name(&self) -> &str {
        self.0.as_ref()
    }

    /// Resolve to an object id: reference lookup first, object-id
    /// fallback second.
    pub fn resolve(&self, repository: &Repository) -> anyhow::Result<ObjectId> {
        let name_str = self.0.as_ref();

        if let Some(oid) = repository.refs().read_ref(name_str)? {
            return Ok(oid);
        }

        if Self::looks_like_oid(name_str) {
            return Self::resolve_oid(name_str, repository);
        }

        Err(RepositoryError::NotFound(format!("reference {}", name_str)).into())
    }

    /// Resolve to a commit id, peeling annotated tags along the way.
    pub fn resolve_commit(&self, repository: &Repository) -> anyhow::Result<ObjectId> {
        let oid = self.resolve(repository)?;
        peel_to_commit(repository, oid)
    }

    fn resolve_oid(oid_str: &str, repository: &Repository) -> anyhow::Result<ObjectId> {
        if oid_str.len() == OBJECT_ID_LENGTH {
            let oid = ObjectId::try_parse(oid_str.to_string())?;
            if !repository.database().exists(&oid) {
                return Err(RepositoryError::NotFound(format!("object {}", oid)).into());
            }
            return Ok(oid);
        }

        let matches = repository.database().find_objects_by_prefix(oid_str)?;
        match matches.len() {
            0 => Err(RepositoryError::NotFound(format!("object prefix {}", oid_str)).into()),
            1 => Ok(matches[0].clone()),
            _ => {
                let mut message =
                    format!("short id {} is ambiguous\nhint: the candidates are:", oid_str);
                for oid in &matches {
                    let kind = repository
                        .database()
                        .get_object_type(oid)
                        .map(|kind| kind.to_string())
                        .unwrap_or_else(|_| "unknown".to_string());
                    message.push_str(&format!("\nhint:   {} {}", oid.to_short_oid(), kind));
                }
                anyhow::bail!(message)
            }
        }
    }

    fn looks_like_oid(s: &str) -> bool {
        // four hex characters is the shortest prefix worth resolving
        s.len() >= 4 && s.len() <= OBJECT_ID_LENGTH && s.chars().all(|c| c.is_ascii_hexdigit())
    }
}

/// Follow annotated tags until a commit appears; anything else is not a
/// valid traversal target.
pub fn peel_to_commit(repository: &Repository, oid: ObjectId) -> anyhow::Result<ObjectId> {
    let mut oid = oid;
    loop {
        match repository.database().get_object_type(&oid)? {
            ObjectType::Commit => return Ok(oid),
            ObjectType::Tag => {
                let object = repository.database().parse_object(&oid)?;
                match object {
                    ObjectBox::Tag(tag) => oid = tag.target().clone(),
                    _ => anyhow::bail!("object {} changed kind mid-read", oid),
                }
            }
            other => {
                anyhow::bail!("object {} is a {}, not a commit", oid.to_short_oid(), other)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_a_simple_ref_name() {
        let revision = Revision::try_parse("main").unwrap();
        assert_eq!(revision.name(), "main");
    }

    #[test]
    fn resolves_the_head_alias() {
        let revision = Revision::try_parse("@").unwrap();
        assert_eq!(revision.name(), "HEAD");
    }

    #[test]
    fn parses_hierarchical_names() {
        let revision = Revision::try_parse("feature/my-feature").unwrap();
        assert_eq!(revision.name(), "feature/my-feature");
    }

    #[test]
    fn rejects_empty_names() {
        assert!(Revision::try_parse("").is_err());
    }

    #[test]
    fn rejects_reserved_lock_suffix() {
        assert!(Revision::try_parse("branch.lock").is_err());
    }

    #[test]
    fn rejects_names_with_forbidden_characters() {
        for name in ["invalid name", "invalid:name", ".invalid", "/invalid", "a..b"] {
            assert!(Revision::try_parse(name).is_err(), "accepted {:?}", name);
        }
    }

    #[test]
    fn oid_shaped_names_still_parse_as_names() {
        // resolution decides later whether it is a ref or an id
        let full = "a".repeat(40);
        let revision = Revision::try_parse(&full).unwrap();
        assert_eq!(revision.name(), full);

        let short = Revision::try_parse("a1b2c3d").unwrap();
        assert_eq!(short.name(), "a1b2c3d");
    }

    fn valid_ref_name_strategy() -> impl Strategy<Value = String> {
        prop::string::string_regex("[a-zA-Z0-9][a-zA-Z0-9_/-]*[a-zA-Z0-9]")
            .unwrap()
            .prop_filter("must not contain invalid patterns", |s| {
                !s.contains("..") && !s.ends_with(".lock") && !s.contains("//") && s.len() < 256
            })
    }

    fn invalid_ref_name_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("".to_string()),
            Just(".invalid".to_string()),
            Just("invalid..name".to_string()),
            Just("/invalid".to_string()),
            Just("invalid/".to_string()),
            Just("invalid.lock".to_string()),
            Just("invalid name".to_string()),
            Just("invalid:name".to_string()),
            Just("invalid*name".to_string()),
            Just("invalid?name".to_string()),
            Just("invalid[name".to_string()),
            Just("invalid\\name".to_string()),
            Just("invalid~name".to_string()),
            Just("invalid^name".to_string()),
            Just("invalid@{name".to_string()),
        ]
    }

    proptest! {
        #[test]
        fn valid_names_parse_and_round_trip(name in valid_ref_name_strategy()) {
            let revision = Revision::try_parse(&name);
            prop_assert!(revision.is_ok());
            let revision = revision.unwrap();
            prop_assert_eq!(revision.name(), &name);
        }

        #[test]
        fn invalid_names_fail_to_parse(name in invalid_ref_name_strategy()) {
            prop_assert!(Revision::try_parse(&name).is_err());
        }

        #[test]
        fn hex_strings_shorter_than_four_chars_are_plain_names(length in 1usize..4) {
            let hex = "a".repeat(length);
            let revision = Revision::try_parse(&hex).unwrap();
            prop_assert_eq!(revision.name(), &hex);
        }
    }
}
