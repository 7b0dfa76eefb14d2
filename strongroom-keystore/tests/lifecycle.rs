use strongroom_envelope::{asymmetric, signing, symmetric};
use strongroom_keystore::{KeyAlgorithm, Keystore, KeystoreError};

fn keystore() -> (tempfile::TempDir, Keystore) {
    let dir = tempfile::tempdir().unwrap();
    let ks = Keystore::new(dir.path().join("keys"));
    (dir, ks)
}

#[test]
fn generate_rsa_persists_keypair_files() {
    let (_dir, mut ks) = keystore();
    let (record, seed) = ks.generate("k1", "first key", KeyAlgorithm::Rsa, 0, 1_000).unwrap();

    assert_eq!(record.name, "k1");
    assert_eq!(record.cipher_alg, "aes");
    assert_eq!(record.expires_at_ms, 0);
    assert!(record.sig_public_pem.is_empty());
    assert!(seed.is_none());

    let (sk_path, pk_path) = asymmetric::key_file_paths(ks.keys_dir(), "k1");
    assert!(sk_path.exists());
    assert!(pk_path.exists());

    // Material is live: the data key round-trips through the envelope.
    let dek = ks.data_key("k1").unwrap();
    let sealed = symmetric::seal(&dek, b"payload").unwrap();
    assert_eq!(symmetric::open(&dek, sealed.as_bytes()).unwrap(), b"payload");

    // And the exported public PEM is non-empty for a loaded RSA key.
    assert!(ks.public_pem(&record).starts_with("-----BEGIN RSA PUBLIC KEY-----"));
}

#[test]
fn generate_duplicate_name_fails() {
    let (_dir, mut ks) = keystore();
    ks.generate("k1", "", KeyAlgorithm::Rsa, 0, 1_000).unwrap();
    match ks.generate("k1", "", KeyAlgorithm::Ed25519, 0, 2_000) {
        Err(KeystoreError::DuplicateName(name)) => assert_eq!(name, "k1"),
        other => panic!("expected DuplicateName, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn generate_ed25519_returns_seed_and_verifies() {
    let (_dir, mut ks) = keystore();
    let (record, seed) = ks.generate("sig", "", KeyAlgorithm::Ed25519, 0, 1_000).unwrap();

    let seed = seed.expect("ed25519 generation must hand back the seed");
    assert!(!record.sig_public_pem.is_empty());

    let signing_key = signing::signing_key_from_base64(&seed).unwrap();
    let sig = signing::sign(&signing_key, b"message");
    ks.verify_signature(&record, b"message", &sig).unwrap();

    // A different seed must not verify.
    let (other, _) = signing::generate_signing_key();
    let bad = signing::sign(&other, b"message");
    assert!(matches!(
        ks.verify_signature(&record, b"message", &bad),
        Err(KeystoreError::BadSignature)
    ));
}

#[test]
fn expiry_is_absolute() {
    let (_dir, mut ks) = keystore();
    let (record, _) = ks.generate("exp", "", KeyAlgorithm::Rsa, 10, 1_000).unwrap();
    assert_eq!(record.expires_at_ms, 1_010);
    assert!(!record.is_expired(1_009));
    assert!(record.is_expired(1_010));
    assert!(record.is_expired(5_000));
}

#[test]
fn remove_clears_catalog_and_files() {
    let (_dir, mut ks) = keystore();
    ks.generate("gone", "", KeyAlgorithm::Rsa, 0, 1_000).unwrap();

    let removed = ks.remove("gone").unwrap();
    assert_eq!(removed.name, "gone");
    assert!(!ks.contains("gone"));
    assert!(ks.names().is_empty());

    let (sk_path, pk_path) = asymmetric::key_file_paths(ks.keys_dir(), "gone");
    assert!(!sk_path.exists());
    assert!(!pk_path.exists());

    assert!(matches!(ks.remove("gone"), Err(KeystoreError::UnknownKey(_))));
}

#[test]
fn modify_renames_all_three_surfaces() {
    let (_dir, mut ks) = keystore();
    ks.generate("before", "old", KeyAlgorithm::Rsa, 0, 1_000).unwrap();

    let updated = ks
        .modify("before", Some("after"), Some("new"), false, 0, 2_000)
        .unwrap();
    assert_eq!(updated.name, "after");
    assert_eq!(updated.description, "new");
    assert_eq!(updated.modified_ms, 2_000);

    assert!(!ks.contains("before"));
    assert!(ks.contains("after"));
    assert_eq!(ks.names(), vec!["after".to_string()]);

    let (old_sk, _) = asymmetric::key_file_paths(ks.keys_dir(), "before");
    let (new_sk, new_pk) = asymmetric::key_file_paths(ks.keys_dir(), "after");
    assert!(!old_sk.exists());
    assert!(new_sk.exists());
    assert!(new_pk.exists());

    // Material followed the rename.
    ks.data_key("after").unwrap();
}

#[test]
fn modify_rejects_colliding_rename() {
    let (_dir, mut ks) = keystore();
    ks.generate("a", "", KeyAlgorithm::Rsa, 0, 1_000).unwrap();
    ks.generate("b", "", KeyAlgorithm::Rsa, 0, 1_000).unwrap();

    assert!(matches!(
        ks.modify("a", Some("b"), None, false, 0, 2_000),
        Err(KeystoreError::DuplicateName(_))
    ));
    // Nothing changed.
    assert!(ks.contains("a"));
    assert!(ks.contains("b"));
}

#[test]
fn modify_updates_expiration() {
    let (_dir, mut ks) = keystore();
    ks.generate("k", "", KeyAlgorithm::Rsa, 0, 1_000).unwrap();

    let updated = ks.modify("k", None, None, true, 500, 2_000).unwrap();
    assert_eq!(updated.expires_at_ms, 2_500);

    let cleared = ks.modify("k", None, None, true, 0, 3_000).unwrap();
    assert_eq!(cleared.expires_at_ms, 0);
}

#[test]
fn export_import_roundtrip_into_fresh_store() {
    let (_dir, mut ks) = keystore();
    let (record, _) = ks.generate("travel", "takes a trip", KeyAlgorithm::Rsa, 0, 1_000).unwrap();
    let dek_before = ks.data_key("travel").unwrap();

    let blob = ks.export("travel").unwrap();

    let dir2 = tempfile::tempdir().unwrap();
    let mut ks2 = Keystore::new(dir2.path().join("keys"));
    let imported = ks2.import("travel", &blob, false).unwrap();

    assert_eq!(imported.description, record.description);
    assert_eq!(imported.wrapped_dek, record.wrapped_dek);
    assert_eq!(ks2.data_key("travel").unwrap(), dek_before);
}

#[test]
fn import_requires_force_to_overwrite() {
    let (_dir, mut ks) = keystore();
    ks.generate("dup", "", KeyAlgorithm::Rsa, 0, 1_000).unwrap();
    let blob = ks.export("dup").unwrap();

    assert!(matches!(
        ks.import("dup", &blob, false),
        Err(KeystoreError::DuplicateName(_))
    ));
    ks.import("dup", &blob, true).unwrap();
}

#[test]
fn import_garbage_is_corrupt() {
    let (_dir, mut ks) = keystore();
    assert!(matches!(
        ks.import("junk", b"definitely not gzip", false),
        Err(KeystoreError::Corrupt)
    ));
}

#[test]
fn rebuild_material_survives_missing_files() {
    let (_dir, mut ks) = keystore();
    ks.generate("orphan", "", KeyAlgorithm::Rsa, 0, 1_000).unwrap();
    let catalog = ks.catalog_snapshot();

    // Fresh keystore over an empty keys dir: rebuild logs and skips.
    let dir2 = tempfile::tempdir().unwrap();
    let mut ks2 = Keystore::from_catalog(dir2.path().join("keys"), catalog);
    ks2.rebuild_material();

    assert!(ks2.contains("orphan"));
    assert!(matches!(ks2.data_key("orphan"), Err(KeystoreError::Internal(_))));
}

#[test]
fn rebuild_material_restores_data_key() {
    let dir = tempfile::tempdir().unwrap();
    let keys_dir = dir.path().join("keys");

    let mut ks = Keystore::new(&keys_dir);
    ks.generate("persist", "", KeyAlgorithm::Rsa, 0, 1_000).unwrap();
    let dek_before = ks.data_key("persist").unwrap();
    let catalog = ks.catalog_snapshot();
    drop(ks);

    let mut reloaded = Keystore::from_catalog(&keys_dir, catalog);
    reloaded.rebuild_material();
    assert_eq!(reloaded.data_key("persist").unwrap(), dek_before);
}
