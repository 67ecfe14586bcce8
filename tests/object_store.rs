//! Loose object store behavior: round-trips, deduplication, read-time
//! verification, and the error surface for missing or damaged objects.

mod common;

use assert_fs::TempDir;
use pretty_assertions::assert_eq;
use silt::artifacts::objects::commit::Author;
use silt::artifacts::objects::object_id::ObjectId;
use silt::artifacts::objects::object_type::ObjectType;
use silt::artifacts::objects::tag::Tag;
use silt::areas::database::Database;
use silt::{RepositoryError, as_repository_error};

fn open_database(dir: &TempDir) -> Database {
    Database::new(dir.path().join("objects").into_boxed_path())
}

#[test]
fn stored_content_reads_back_byte_identical() {
    let dir = TempDir::new().unwrap();
    let database = open_database(&dir);

    let content = common::lorem();
    let oid = database.put(ObjectType::Blob, content.as_bytes()).unwrap();

    let (object_type, loaded) = database.load(&oid).unwrap();

    assert_eq!(object_type, ObjectType::Blob);
    assert_eq!(&loaded[..], content.as_bytes());
}

#[test]
fn binary_content_survives_the_round_trip() {
    let dir = TempDir::new().unwrap();
    let database = open_database(&dir);

    let content: Vec<u8> = vec![0x00, 0xff, 0x1b, 0x00, 0x80, 0x7f, 0x0a, 0x00];
    let oid = database.put(ObjectType::Blob, &content).unwrap();

    let (_, loaded) = database.load(&oid).unwrap();

    assert_eq!(&loaded[..], &content[..]);
}

#[test]
fn identical_content_deduplicates_to_one_loose_file() {
    let dir = TempDir::new().unwrap();
    let database = open_database(&dir);

    let content = common::lorem();
    let first = database.put(ObjectType::Blob, content.as_bytes()).unwrap();
    let second = database.put(ObjectType::Blob, content.as_bytes()).unwrap();

    assert_eq!(first, second);
    assert_eq!(database.list_loose_objects().unwrap(), vec![first]);
}

#[test]
fn missing_object_is_reported_as_not_found() {
    let dir = TempDir::new().unwrap();
    let database = open_database(&dir);

    let absent = ObjectId::try_parse("a".repeat(40)).unwrap();
    let error = database.load(&absent).unwrap_err();

    assert!(matches!(
        as_repository_error(&error),
        Some(RepositoryError::NotFound(_))
    ));
    assert!(!database.exists(&absent));
}

#[test]
fn swapped_loose_file_fails_the_rehash_check() {
    let dir = TempDir::new().unwrap();
    let database = open_database(&dir);

    let victim = database.put(ObjectType::Blob, b"original content").unwrap();
    let imposter = database.put(ObjectType::Blob, b"someone else entirely").unwrap();

    let victim_path = database.objects_path().join(victim.to_path());
    let imposter_path = database.objects_path().join(imposter.to_path());
    std::fs::copy(&imposter_path, &victim_path).unwrap();

    let error = database.load(&victim).unwrap_err();

    match as_repository_error(&error) {
        Some(RepositoryError::CorruptObject { oid, reason }) => {
            assert_eq!(oid, &victim);
            assert!(reason.contains(&imposter.to_string()));
        }
        other => panic!("expected CorruptObject, got {:?}", other),
    }
}

#[test]
fn garbage_loose_file_is_corrupt_not_a_panic() {
    let dir = TempDir::new().unwrap();
    let database = open_database(&dir);

    let oid = database.put(ObjectType::Blob, b"soon to be trampled").unwrap();
    let object_path = database.objects_path().join(oid.to_path());
    std::fs::write(&object_path, b"this is not zlib data").unwrap();

    let error = database.load(&oid).unwrap_err();

    assert!(matches!(
        as_repository_error(&error),
        Some(RepositoryError::CorruptObject { .. })
    ));
}

#[test]
fn annotated_tag_objects_parse_back_with_all_fields() {
    let dir = TempDir::new().unwrap();
    let database = open_database(&dir);

    let target = database.put(ObjectType::Blob, b"tagged content").unwrap();
    let tagger = Author::new_with_timestamp(
        "Grace Hopper".to_string(),
        "grace@example.com".to_string(),
        common::base_time(),
    );
    let tag = Tag::new(
        target.clone(),
        ObjectType::Blob,
        "v1.0.0".to_string(),
        tagger,
        "first release".to_string(),
    );

    let tag_oid = database.store(&tag).unwrap();
    let parsed = database.parse_object_as_tag(&tag_oid).unwrap().unwrap();

    assert_eq!(parsed.target(), &target);
    assert_eq!(parsed.target_type(), ObjectType::Blob);
    assert_eq!(parsed.name(), "v1.0.0");
    assert_eq!(parsed.message(), "first release");
}

#[test]
fn prefix_search_resolves_abbreviated_ids() {
    let dir = TempDir::new().unwrap();
    let database = open_database(&dir);

    let oid = database.put(ObjectType::Blob, b"findable by prefix").unwrap();

    let matches = database.find_objects_by_prefix(&oid.to_short_oid()).unwrap();

    assert_eq!(matches, vec![oid]);
}
