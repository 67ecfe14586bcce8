//! Packing loose objects and reading them back: content must survive
//! byte-identical through delta compression, and the pack must be
//! publishable without ever hiding an object from readers.

mod common;

use pretty_assertions::assert_eq;
use silt::artifacts::objects::object_id::ObjectId;
use silt::artifacts::objects::object_type::ObjectType;
use silt::artifacts::pack::reader::PackReader;
use std::collections::BTreeMap;

/// Blobs large and alike enough that the writer is guaranteed to find
/// profitable deltas among them.
fn similar_blobs() -> Vec<Vec<u8>> {
    (0..6)
        .map(|n| {
            let mut lines: Vec<String> =
                (0..64).map(|i| format!("shared line number {:03}", i)).collect();
            lines[n * 8] = format!("revision {} touched this line", n);
            lines.join("\n").into_bytes()
        })
        .collect()
}

#[tokio::test]
async fn packed_objects_read_back_byte_identical() {
    let (_dir, repository) = common::init_repository().await;
    let database = repository.database();

    let mut snapshot = BTreeMap::<ObjectId, (ObjectType, Vec<u8>)>::new();
    for content in similar_blobs() {
        let oid = database.put(ObjectType::Blob, &content).unwrap();
        snapshot.insert(oid, (ObjectType::Blob, content));
    }

    let pack = repository.repack().unwrap().expect("loose objects were present");

    assert_eq!(pack.record_count, snapshot.len());
    assert!(pack.delta_count > 0);
    assert!(pack.pack_path.exists());
    assert!(pack.index_path.exists());

    // The loose tier is gone; every read now comes out of the pack.
    assert!(database.list_loose_objects().unwrap().is_empty());

    for (oid, (expected_type, expected_content)) in &snapshot {
        let (object_type, content) = database.load(oid).unwrap();
        assert_eq!(&object_type, expected_type);
        assert_eq!(&content[..], &expected_content[..]);
    }
}

#[tokio::test]
async fn repacking_an_empty_loose_tier_is_a_no_op() {
    let (_dir, repository) = common::init_repository().await;

    assert!(repository.repack().unwrap().is_none());
    assert!(!repository.database().pack_path().exists());
}

#[tokio::test]
async fn full_history_survives_a_repack() {
    let (_dir, repository) = common::init_repository().await;

    let first = common::commit_file(&repository, "a.txt", "alpha\n", "first", 0).await;
    common::write_file(&repository, "b.txt", "beta\n");
    repository.add(&[std::path::Path::new("b.txt").to_path_buf()]).await.unwrap();
    let second = repository.commit(common::author_at(10), "second").await.unwrap();

    repository.repack().unwrap().expect("commits produced loose objects");

    // Commit, tree and blob lookups all cross into the pack tier.
    let commit = repository
        .database()
        .parse_object_as_commit(&second)
        .unwrap()
        .unwrap();
    assert_eq!(commit.parent(), Some(&first));
    assert_eq!(commit.message(), "second");

    let mut head_tree = BTreeMap::new();
    silt::artifacts::status::status_info::flatten_tree(
        repository.database(),
        commit.tree_oid(),
        std::path::Path::new(""),
        &mut head_tree,
    )
    .unwrap();
    assert_eq!(head_tree.len(), 2);

    for entry in head_tree.values() {
        let blob = repository
            .database()
            .parse_object_as_blob(&entry.oid)
            .unwrap()
            .unwrap();
        assert!(!blob.content().is_empty());
    }
}

#[tokio::test]
async fn published_pack_verifies_against_its_checksums() {
    let (_dir, repository) = common::init_repository().await;

    for content in similar_blobs() {
        repository.database().put(ObjectType::Blob, &content).unwrap();
    }

    let pack = repository.repack().unwrap().unwrap();
    let reader = PackReader::open(&pack.pack_path).unwrap();

    reader.verify().unwrap();
}

#[tokio::test]
async fn prefix_search_reaches_into_packs() {
    let (_dir, repository) = common::init_repository().await;
    let database = repository.database();

    let packed = database.put(ObjectType::Blob, b"soon packed").unwrap();
    repository.repack().unwrap().unwrap();

    let loose = database.put(ObjectType::Blob, b"still loose").unwrap();

    let packed_matches = database.find_objects_by_prefix(&packed.to_short_oid()).unwrap();
    let loose_matches = database.find_objects_by_prefix(&loose.to_short_oid()).unwrap();

    assert_eq!(packed_matches, vec![packed]);
    assert_eq!(loose_matches, vec![loose]);
}

#[tokio::test]
async fn second_repack_folds_newly_loose_objects_into_a_new_pack() {
    let (_dir, repository) = common::init_repository().await;
    let database = repository.database();

    let first_gen = database.put(ObjectType::Blob, b"generation one").unwrap();
    let first_pack = repository.repack().unwrap().unwrap();

    let second_gen = database.put(ObjectType::Blob, b"generation two").unwrap();
    let second_pack = repository.repack().unwrap().unwrap();

    assert_ne!(first_pack.pack_path, second_pack.pack_path);

    // Both generations stay readable side by side.
    assert!(database.load(&first_gen).is_ok());
    assert!(database.load(&second_gen).is_ok());
}
