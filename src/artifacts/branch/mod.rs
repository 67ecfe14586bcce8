pub mod branch_name;
pub mod revision;

/// Patterns a reference name may not contain. `.lock` is reserved for
/// the lock files the reference store writes next to live refs.
pub const INVALID_BRANCH_NAME_REGEX: &str =
    r"^\.|\/\.|\.\.|^\/|\/$|\.lock$|@\{|[\x00-\x20\*:\?\[\\~\^\x7f]";

pub const REF_ALIASES: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "@" => "HEAD",
};
