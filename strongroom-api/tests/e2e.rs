//! End-to-end scenarios over the assembled server state, network layer
//! excluded: generate keys, run the pipeline, snapshot and restore.

use std::path::PathBuf;

use strongroom_api::config::ServerConfig;
use strongroom_api::pipeline::{self, DecryptInput, EncryptInput};
use strongroom_api::{backup_task, now_ms, AppState, ServiceError, Shared};
use strongroom_envelope::signing;
use strongroom_keystore::KeyAlgorithm;
use strongroom_storage::backup;

fn test_state(dir: &tempfile::TempDir) -> Shared {
    let storage_root = dir.path().join(".storage");
    let config_path = dir.path().join(".config").join("config-server.json");
    let config = ServerConfig::load_or_init(&config_path).unwrap();
    AppState::bootstrap(storage_root, config, config_path).unwrap()
}

async fn generate(state: &Shared, name: &str, algorithm: KeyAlgorithm, expires_in_ms: i64) -> Option<String> {
    let seed = {
        let mut ks = state.keystore.write().await;
        let (_, seed) = ks.generate(name, "", algorithm, expires_in_ms, now_ms()).unwrap();
        seed
    };
    state.flush_index().await.unwrap();
    seed
}

fn encrypt_input(path: &str, name: &str, key: &str, data: &[u8], overwrite: bool) -> EncryptInput {
    EncryptInput {
        file_name: name.to_string(),
        storage_path: path.to_string(),
        key_id: key.to_string(),
        overwrite,
        plaintext: data.to_vec(),
        size_bytes: data.len() as u64,
        signature: None,
    }
}

#[tokio::test]
async fn rsa_encrypt_then_decrypt_returns_plaintext() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    generate(&state, "k1", KeyAlgorithm::Rsa, 0).await;

    let outcome = pipeline::encrypt(&state, encrypt_input("/docs", "a.txt", "k1", b"hello", false))
        .await
        .unwrap();
    assert_eq!(outcome.storage_path, "docs");
    assert_eq!(outcome.file_id.len(), 64);

    let decrypted = pipeline::decrypt(
        &state,
        DecryptInput { path: "/docs/a.txt".into(), key_id: "k1".into(), signature: None },
    )
    .await
    .unwrap();
    assert_eq!(decrypted.plaintext, b"hello");
    assert_eq!(decrypted.size_bytes, 5);
    assert_eq!(decrypted.file_name, "a.txt");
    assert_eq!(decrypted.storage_path, "/docs");
}

#[tokio::test]
async fn duplicate_path_first_write_wins() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    generate(&state, "k1", KeyAlgorithm::Rsa, 0).await;

    pipeline::encrypt(&state, encrypt_input("/", "x", "k1", b"A", false)).await.unwrap();
    let second = pipeline::encrypt(&state, encrypt_input("/", "x", "k1", b"B", false)).await;
    assert!(matches!(second, Err(ServiceError::Duplicate(_))));

    let decrypted = pipeline::decrypt(
        &state,
        DecryptInput { path: "/x".into(), key_id: "k1".into(), signature: None },
    )
    .await
    .unwrap();
    assert_eq!(decrypted.plaintext, b"A");
}

#[tokio::test]
async fn overwrite_replaces_content() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    generate(&state, "k1", KeyAlgorithm::Rsa, 0).await;

    pipeline::encrypt(&state, encrypt_input("/", "x", "k1", b"A", false)).await.unwrap();
    pipeline::encrypt(&state, encrypt_input("/", "x", "k1", b"B", true)).await.unwrap();

    let decrypted = pipeline::decrypt(
        &state,
        DecryptInput { path: "/x".into(), key_id: "k1".into(), signature: None },
    )
    .await
    .unwrap();
    assert_eq!(decrypted.plaintext, b"B");
}

#[tokio::test]
async fn expired_key_denies_encrypt_allows_decrypt() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    generate(&state, "k1", KeyAlgorithm::Rsa, 0).await;

    // Inside the expiry window: encrypt succeeds.
    pipeline::encrypt(&state, encrypt_input("/", "early", "k1", b"data", false)).await.unwrap();

    // Give the key a 10 ms lifetime and let it lapse.
    {
        let mut ks = state.keystore.write().await;
        ks.modify("k1", None, None, true, 10, now_ms()).unwrap();
    }
    state.flush_index().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let late = pipeline::encrypt(&state, encrypt_input("/", "late", "k1", b"data", false)).await;
    assert!(matches!(late, Err(ServiceError::Expired(_))));

    // Read-only survival: previously encrypted objects still decrypt.
    let decrypted = pipeline::decrypt(
        &state,
        DecryptInput { path: "/early".into(), key_id: "k1".into(), signature: None },
    )
    .await
    .unwrap();
    assert_eq!(decrypted.plaintext, b"data");
}

#[tokio::test]
async fn empty_key_id_is_no_key() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);

    let enc = pipeline::encrypt(&state, encrypt_input("/", "x", "", b"A", false)).await;
    assert!(matches!(enc, Err(ServiceError::NoKey)));

    let dec = pipeline::decrypt(
        &state,
        DecryptInput { path: "/x".into(), key_id: "".into(), signature: None },
    )
    .await;
    assert!(matches!(dec, Err(ServiceError::NoKey)));
}

#[tokio::test]
async fn unknown_key_and_missing_object() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    generate(&state, "k1", KeyAlgorithm::Rsa, 0).await;

    let enc = pipeline::encrypt(&state, encrypt_input("/", "x", "ghost", b"A", false)).await;
    assert!(matches!(enc, Err(ServiceError::UnknownKey(_))));

    let dec = pipeline::decrypt(
        &state,
        DecryptInput { path: "/nothing".into(), key_id: "k1".into(), signature: None },
    )
    .await;
    assert!(matches!(dec, Err(ServiceError::NotFound(_))));
}

#[tokio::test]
async fn dotdot_paths_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    generate(&state, "k1", KeyAlgorithm::Rsa, 0).await;

    let enc =
        pipeline::encrypt(&state, encrypt_input("/a/../b", "x", "k1", b"A", false)).await;
    assert!(matches!(enc, Err(ServiceError::InvalidPath(_))));

    let name = pipeline::encrypt(&state, encrypt_input("/a", "..", "k1", b"A", false)).await;
    assert!(matches!(name, Err(ServiceError::InvalidPath(_))));
}

#[tokio::test]
async fn ed25519_signatures_gate_both_paths() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    let seed = generate(&state, "sig", KeyAlgorithm::Ed25519, 0).await.unwrap();
    let signing_key = signing::signing_key_from_base64(&seed).unwrap();

    // Unsigned encrypt is rejected.
    let unsigned = pipeline::encrypt(&state, encrypt_input("/", "x", "sig", b"secret", false)).await;
    assert!(matches!(unsigned, Err(ServiceError::BadSignature)));

    // Signed over the plaintext: accepted.
    let mut input = encrypt_input("/", "x", "sig", b"secret", false);
    input.signature = Some(signing::sign(&signing_key, b"secret"));
    pipeline::encrypt(&state, input).await.unwrap();

    // Decrypt needs a signature over the path bytes.
    let bad = pipeline::decrypt(
        &state,
        DecryptInput {
            path: "/x".into(),
            key_id: "sig".into(),
            signature: Some(signing::sign(&signing_key, b"/other")),
        },
    )
    .await;
    assert!(matches!(bad, Err(ServiceError::BadSignature)));

    let good = pipeline::decrypt(
        &state,
        DecryptInput {
            path: "/x".into(),
            key_id: "sig".into(),
            signature: Some(signing::sign(&signing_key, b"/x")),
        },
    )
    .await
    .unwrap();
    assert_eq!(good.plaintext, b"secret");
}

#[tokio::test]
async fn remove_then_decrypt_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    generate(&state, "k1", KeyAlgorithm::Rsa, 0).await;

    pipeline::encrypt(&state, encrypt_input("/docs", "a", "k1", b"A", false)).await.unwrap();
    pipeline::remove_entry(&state, "/docs/a").await.unwrap();

    let dec = pipeline::decrypt(
        &state,
        DecryptInput { path: "/docs/a".into(), key_id: "k1".into(), signature: None },
    )
    .await;
    assert!(matches!(dec, Err(ServiceError::NotFound(_))));

    assert!(matches!(
        pipeline::remove_entry(&state, "/docs/a").await,
        Err(ServiceError::NotFound(_))
    ));
}

#[tokio::test]
async fn root_listing_is_recursive_capable() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    generate(&state, "k1", KeyAlgorithm::Rsa, 0).await;

    pipeline::encrypt(&state, encrypt_input("/", "top", "k1", b"1", false)).await.unwrap();
    pipeline::encrypt(&state, encrypt_input("/deep/nested", "leaf", "k1", b"2", false))
        .await
        .unwrap();

    let idx = state.index.read().await;
    let direct = idx.doc.root.list("/", false).unwrap();
    assert_eq!(direct.len(), 1);

    let all = idx.doc.root.list("/", true).unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().any(|e| e.path == "/deep/nested/leaf"));
}

#[tokio::test]
async fn snapshot_remove_restore_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    generate(&state, "k1", KeyAlgorithm::Rsa, 0).await;

    pipeline::encrypt(&state, encrypt_input("/", "a", "k1", b"kept", false)).await.unwrap();

    let snapshot_name = backup_task::quiesced_snapshot(&state).await.unwrap();
    // Keep the safety snapshot's timestamped name from colliding.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    pipeline::remove_entry(&state, "/a").await.unwrap();
    assert!(pipeline::decrypt(
        &state,
        DecryptInput { path: "/a".into(), key_id: "k1".into(), signature: None },
    )
    .await
    .is_err());

    let safety = backup_task::restore(&state, &snapshot_name).await.unwrap();
    assert!(safety.name.starts_with("storage_"));
    assert_ne!(safety.name, snapshot_name);

    let decrypted = pipeline::decrypt(
        &state,
        DecryptInput { path: "/a".into(), key_id: "k1".into(), signature: None },
    )
    .await
    .unwrap();
    assert_eq!(decrypted.plaintext, b"kept");
}

#[tokio::test]
async fn restore_of_missing_archive_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    generate(&state, "k1", KeyAlgorithm::Rsa, 0).await;
    pipeline::encrypt(&state, encrypt_input("/", "a", "k1", b"live", false)).await.unwrap();

    let result = backup_task::restore(&state, "storage_0.zip").await;
    assert!(matches!(result, Err(ServiceError::NotFound(_))));

    // Live store untouched.
    let decrypted = pipeline::decrypt(
        &state,
        DecryptInput { path: "/a".into(), key_id: "k1".into(), signature: None },
    )
    .await
    .unwrap();
    assert_eq!(decrypted.plaintext, b"live");
}

#[tokio::test]
async fn orphan_blob_after_remove_is_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    generate(&state, "k1", KeyAlgorithm::Rsa, 0).await;

    let outcome =
        pipeline::encrypt(&state, encrypt_input("/", "a", "k1", b"X", false)).await.unwrap();

    // Simulate an out-of-band unlink: removal still succeeds.
    let blob_path: PathBuf = state.storage_root.join(&outcome.file_id);
    std::fs::remove_file(&blob_path).unwrap();
    pipeline::remove_entry(&state, "/a").await.unwrap();
}

#[tokio::test]
async fn backup_loop_snapshots_on_schedule_then_exits_when_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    generate(&state, "k1", KeyAlgorithm::Rsa, 0).await;
    pipeline::encrypt(&state, encrypt_input("/", "a", "k1", b"X", false)).await.unwrap();

    {
        let mut config = state.config.write().await;
        config.backup.enable = true;
        config.backup.frequency_ms = 50;
        config.backup.retention_ms = 100_000;
    }
    backup_task::spawn_backup_loop(state.clone());
    // Spawning again while live must not start a second loop.
    backup_task::spawn_backup_loop(state.clone());

    // The loop ticks at 1 Hz; with a 50 ms frequency every tick snapshots.
    tokio::time::sleep(std::time::Duration::from_millis(2_600)).await;
    let backups = backup::list(&state.storage_root, 100_000, now_ms()).unwrap();
    assert!(backups.len() >= 2, "expected at least two scheduled snapshots, got {}", backups.len());

    {
        state.config.write().await.backup.enable = false;
    }
    tokio::time::sleep(std::time::Duration::from_millis(1_500)).await;
    assert!(!state.backup.running.load(std::sync::atomic::Ordering::SeqCst));
}

#[tokio::test]
async fn snapshot_includes_consistent_index() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    generate(&state, "k1", KeyAlgorithm::Rsa, 0).await;
    pipeline::encrypt(&state, encrypt_input("/", "a", "k1", b"X", false)).await.unwrap();

    let name = backup_task::quiesced_snapshot(&state).await.unwrap();

    let archive = std::fs::File::open(backup::backup_dir(&state.storage_root).join(&name)).unwrap();
    let mut zip = zip::ZipArchive::new(archive).unwrap();
    let names: Vec<String> = (0..zip.len())
        .map(|i| zip.by_index(i).unwrap().name().to_string())
        .collect();
    assert!(names.contains(&"internal.json".to_string()));
}
