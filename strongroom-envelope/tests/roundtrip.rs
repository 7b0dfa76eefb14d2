use strongroom_envelope::{asymmetric, generate_dek, signing, symmetric, EnvelopeError, IV_BYTES};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

#[test]
fn symmetric_roundtrip_basic() {
    let key = generate_dek().unwrap();
    let envelope = symmetric::seal(&key, b"hello world").unwrap();
    let plaintext = symmetric::open(&key, envelope.as_bytes()).unwrap();
    assert_eq!(plaintext, b"hello world");
}

#[test]
fn symmetric_roundtrip_empty() {
    let key = generate_dek().unwrap();
    let envelope = symmetric::seal(&key, b"").unwrap();
    let plaintext = symmetric::open(&key, envelope.as_bytes()).unwrap();
    assert_eq!(plaintext, b"");
}

#[test]
fn symmetric_roundtrip_large() {
    let key = generate_dek().unwrap();
    let message = vec![0xA7u8; 65536];
    let envelope = symmetric::seal(&key, &message).unwrap();
    let plaintext = symmetric::open(&key, envelope.as_bytes()).unwrap();
    assert_eq!(plaintext, message);
}

#[test]
fn symmetric_fresh_iv_per_seal() {
    let key = generate_dek().unwrap();
    let a = symmetric::seal(&key, b"same plaintext").unwrap();
    let b = symmetric::seal(&key, b"same plaintext").unwrap();
    assert_ne!(a, b);
}

#[test]
fn symmetric_bad_base64_is_corrupt() {
    let key = generate_dek().unwrap();
    assert_eq!(
        symmetric::open(&key, b"!!! not base64 !!!"),
        Err(EnvelopeError::Corrupt)
    );
}

#[test]
fn symmetric_short_envelope_is_corrupt() {
    let key = generate_dek().unwrap();
    let short = BASE64.encode(vec![0u8; IV_BYTES - 1]);
    assert_eq!(
        symmetric::open(&key, short.as_bytes()),
        Err(EnvelopeError::Corrupt)
    );
}

#[test]
fn wrap_unwrap_dek_roundtrip() {
    let (private, public) = asymmetric::generate_keypair().unwrap();
    let dek = generate_dek().unwrap();

    let wrapped = asymmetric::wrap_dek(&public, &dek).unwrap();
    let recovered = asymmetric::unwrap_dek(&private, &wrapped).unwrap();
    assert_eq!(recovered, dek);
}

#[test]
fn unwrap_with_wrong_key_fails() {
    let (_, public) = asymmetric::generate_keypair().unwrap();
    let (other_private, _) = asymmetric::generate_keypair().unwrap();
    let dek = generate_dek().unwrap();

    let wrapped = asymmetric::wrap_dek(&public, &dek).unwrap();
    assert!(asymmetric::unwrap_dek(&other_private, &wrapped).is_err());
}

#[test]
fn keypair_pem_files_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let (private, public) = asymmetric::generate_keypair().unwrap();

    asymmetric::write_keypair_pem(dir.path(), "unit-key", &private).unwrap();

    let (sk_path, pk_path) = asymmetric::key_file_paths(dir.path(), "unit-key");
    assert!(sk_path.exists());
    assert!(pk_path.exists());

    let reloaded_private = asymmetric::read_private_pem(&sk_path).unwrap();
    let reloaded_public = asymmetric::read_public_pem(&pk_path).unwrap();
    assert_eq!(reloaded_public, public);

    // The reloaded private half unwraps what the original public wrapped.
    let dek = generate_dek().unwrap();
    let wrapped = asymmetric::wrap_dek(&public, &dek).unwrap();
    assert_eq!(asymmetric::unwrap_dek(&reloaded_private, &wrapped).unwrap(), dek);
}

#[test]
fn signature_roundtrip() {
    let (signing, verifying) = signing::generate_signing_key();
    let pem = signing::verifying_key_to_pem(&verifying).unwrap();

    let sig = signing::sign(&signing, b"payload");
    signing::verify(&pem, b"payload", &sig).unwrap();
}

#[test]
fn signature_rejects_other_key() {
    let (signing, _) = signing::generate_signing_key();
    let (_, other_verifying) = signing::generate_signing_key();
    let other_pem = signing::verifying_key_to_pem(&other_verifying).unwrap();

    let sig = signing::sign(&signing, b"payload");
    assert_eq!(
        signing::verify(&other_pem, b"payload", &sig),
        Err(EnvelopeError::BadSignature)
    );
}

#[test]
fn signature_rejects_tampered_message() {
    let (signing, verifying) = signing::generate_signing_key();
    let pem = signing::verifying_key_to_pem(&verifying).unwrap();

    let sig = signing::sign(&signing, b"payload");
    assert_eq!(
        signing::verify(&pem, b"tampered", &sig),
        Err(EnvelopeError::BadSignature)
    );
}

#[test]
fn signature_rejects_garbage_signature() {
    let (_, verifying) = signing::generate_signing_key();
    let pem = signing::verifying_key_to_pem(&verifying).unwrap();
    assert_eq!(
        signing::verify(&pem, b"payload", b"way too short"),
        Err(EnvelopeError::BadSignature)
    );
}

#[test]
fn seed_base64_roundtrip() {
    let (signing, verifying) = signing::generate_signing_key();
    let seed = signing::seed_to_base64(&signing);

    let rebuilt = signing::signing_key_from_base64(&seed).unwrap();
    let pem = signing::verifying_key_to_pem(&verifying).unwrap();

    let sig = signing::sign(&rebuilt, b"same signer");
    signing::verify(&pem, b"same signer", &sig).unwrap();
}
