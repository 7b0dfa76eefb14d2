use std::fs;

use strongroom_storage::{backup, blob, ObjectKind, StorageIndex, StoreError, INDEX_FILE};

#[test]
fn index_created_on_first_open() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("storage");

    let index = StorageIndex::open(&root, 100).unwrap();
    assert!(index.index_path().is_file());
    assert_eq!(index.doc.created_ms, 100);
}

#[test]
fn tree_isomorphic_across_persist_reload() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("storage");

    let mut index = StorageIndex::open(&root, 0).unwrap();
    index
        .doc
        .root
        .store("id-1", "/docs/a.txt", 5, ObjectKind::File, false, 10)
        .unwrap();
    index
        .doc
        .root
        .store("id-2", "/docs/deep/b.txt", 7, ObjectKind::File, false, 20)
        .unwrap();
    index.persist(30).unwrap();

    let reloaded = StorageIndex::open(&root, 999).unwrap();
    let a = reloaded.doc.root.get_file("/docs/a.txt").unwrap();
    assert_eq!(a.file_id, "id-1");
    assert_eq!(a.size_bytes, 5);
    assert_eq!(a.created_ms, 10);

    let listing = reloaded.doc.root.list("/", true).unwrap();
    assert_eq!(listing.len(), 2);
}

#[test]
fn corrupt_index_document_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("storage");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join(INDEX_FILE), "{ not json").unwrap();

    assert!(matches!(
        StorageIndex::open(&root, 0),
        Err(StoreError::Corrupt(_))
    ));
}

#[test]
fn blob_write_read_remove() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("storage");

    let id = blob::file_id_for(&root, "/docs", "a.txt");
    assert_eq!(id.len(), 64);
    // Stable: same inputs, same id.
    assert_eq!(id, blob::file_id_for(&root, "/docs", "a.txt"));
    // Leading/trailing slashes collapse to the same physical path.
    assert_eq!(id, blob::file_id_for(&root, "docs/", "a.txt"));

    blob::write_blob(&root, &id, b"ciphertext").unwrap();
    assert_eq!(blob::read_blob(&root, &id).unwrap(), b"ciphertext");

    blob::remove_blob(&root, &id);
    assert!(matches!(blob::read_blob(&root, &id), Err(StoreError::NotFound(_))));

    // Removing again is silent.
    blob::remove_blob(&root, &id);
}

#[test]
fn snapshot_excludes_backups_and_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("storage");
    fs::create_dir_all(root.join("keys")).unwrap();
    fs::write(root.join("blob-1"), b"one").unwrap();
    fs::write(root.join("keys/k1"), b"pem").unwrap();

    // A pre-existing archive must not be re-archived.
    backup::ensure_backup_dir(&root).unwrap();
    fs::write(backup::backup_dir(&root).join("old.zip"), b"zzz").unwrap();

    let name = backup::snapshot(&root, 1_000).unwrap();
    assert_eq!(name, "storage_1000.zip");

    let archive = fs::File::open(backup::backup_dir(&root).join(&name)).unwrap();
    let mut zip = zip::ZipArchive::new(archive).unwrap();
    let names: Vec<String> = (0..zip.len())
        .map(|i| zip.by_index(i).unwrap().name().to_string())
        .collect();
    assert!(names.contains(&"blob-1".to_string()));
    assert!(names.contains(&"keys/k1".to_string()));
    assert!(!names.iter().any(|n| n.contains("old.zip")));

    // Wipe and restore.
    backup::clear_storage_except_backups(&root).unwrap();
    assert!(!root.join("blob-1").exists());
    assert!(backup::backup_dir(&root).join(&name).exists());

    backup::extract(&root, &name).unwrap();
    assert_eq!(fs::read(root.join("blob-1")).unwrap(), b"one");
    assert_eq!(fs::read(root.join("keys/k1")).unwrap(), b"pem");
}

#[test]
fn retention_sweep_removes_only_expired() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("storage");
    backup::ensure_backup_dir(&root).unwrap();
    fs::write(backup::backup_dir(&root).join("a.zip"), b"a").unwrap();

    let mtime = fs::metadata(backup::backup_dir(&root).join("a.zip"))
        .unwrap()
        .modified()
        .unwrap()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64;

    // Not yet expired.
    assert_eq!(backup::sweep_retention(&root, 10_000, mtime + 5_000), 0);
    assert!(backup::backup_dir(&root).join("a.zip").exists());

    // Expired.
    assert_eq!(backup::sweep_retention(&root, 10_000, mtime + 10_000), 1);
    assert!(!backup::backup_dir(&root).join("a.zip").exists());
}

#[test]
fn backup_archive_management() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("storage");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("blob"), b"data").unwrap();

    let name = backup::snapshot(&root, 42).unwrap();

    let listed = backup::list(&root, 1_000_000, 50).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, name);
    assert!(listed[0].expires_in_ms <= 1_000_000);

    let bytes = backup::export(&root, &name).unwrap();
    assert!(!bytes.is_empty());

    // Import under the same name collides; a fresh name succeeds.
    assert!(matches!(
        backup::import(&root, &name, &bytes),
        Err(StoreError::Duplicate(_))
    ));
    backup::import(&root, "copy.zip", &bytes).unwrap();

    let removed = backup::remove(&root, "copy.zip", 1_000_000, 60).unwrap();
    assert_eq!(removed.name, "copy.zip");
    assert!(matches!(
        backup::remove(&root, "copy.zip", 1_000_000, 60),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn backup_names_cannot_traverse() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("storage");
    backup::ensure_backup_dir(&root).unwrap();

    assert!(matches!(
        backup::export(&root, "../internal.json"),
        Err(StoreError::InvalidPath(_))
    ));
    assert!(matches!(
        backup::import(&root, "..", b"x"),
        Err(StoreError::InvalidPath(_))
    ));
}
