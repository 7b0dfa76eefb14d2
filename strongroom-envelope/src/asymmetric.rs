//! RSA keypairs: generation, PKCS#1 PEM files, OAEP wrapping of DEKs.

use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rsa::pkcs1::{
    DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding,
};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::EnvelopeError;
use crate::DEK_BYTES;

pub const RSA_BITS: usize = 2048;

/// Historical OAEP label. Wrapped DEKs written by prior versions used this
/// label, so it must never change.
const OAEP_LABEL: &str = "OAEP Encrypted";

fn oaep() -> Oaep {
    Oaep::new_with_label::<Sha256, _>(OAEP_LABEL)
}

/// Sample a fresh 2048-bit keypair.
pub fn generate_keypair() -> Result<(RsaPrivateKey, RsaPublicKey), EnvelopeError> {
    let mut rng = rand::rngs::OsRng;
    let private = RsaPrivateKey::new(&mut rng, RSA_BITS)
        .map_err(|e| EnvelopeError::CryptoFailure(e.to_string()))?;
    let public = RsaPublicKey::from(&private);
    Ok((private, public))
}

/// OAEP-encrypt a DEK under `public`, returning base64 of the ciphertext.
pub fn wrap_dek(public: &RsaPublicKey, dek: &[u8; DEK_BYTES]) -> Result<String, EnvelopeError> {
    let mut rng = rand::rngs::OsRng;
    let wrapped = public
        .encrypt(&mut rng, oaep(), dek)
        .map_err(|e| EnvelopeError::CryptoFailure(e.to_string()))?;
    Ok(BASE64.encode(wrapped))
}

/// Recover a DEK from its base64 OAEP ciphertext.
pub fn unwrap_dek(
    private: &RsaPrivateKey,
    wrapped_b64: &str,
) -> Result<[u8; DEK_BYTES], EnvelopeError> {
    let wrapped = BASE64.decode(wrapped_b64).map_err(|_| EnvelopeError::Corrupt)?;
    let raw = private
        .decrypt(oaep(), &wrapped)
        .map_err(|e| EnvelopeError::CryptoFailure(e.to_string()))?;
    raw.as_slice().try_into().map_err(|_| EnvelopeError::Corrupt)
}

/// Paths of the private/public PEM files for a named key.
pub fn key_file_paths(dir: &Path, name: &str) -> (PathBuf, PathBuf) {
    (dir.join(name), dir.join(format!("{}.pub", name)))
}

/// Persist a keypair as `<dir>/<name>` and `<dir>/<name>.pub` in PKCS#1 PEM.
/// The private key file is created with mode 600 on Unix.
pub fn write_keypair_pem(
    dir: &Path,
    name: &str,
    private: &RsaPrivateKey,
) -> Result<(), EnvelopeError> {
    fs::create_dir_all(dir)?;
    let (sk_path, pk_path) = key_file_paths(dir, name);

    let sk_pem = private
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| EnvelopeError::InvalidKey(e.to_string()))?;
    let pk_pem = RsaPublicKey::from(private)
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| EnvelopeError::InvalidKey(e.to_string()))?;

    fs::write(&sk_path, sk_pem.as_bytes())?;
    fs::write(&pk_path, pk_pem.as_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&sk_path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(&sk_path, perms)?;
    }

    Ok(())
}

pub fn read_private_pem(path: &Path) -> Result<RsaPrivateKey, EnvelopeError> {
    let pem = fs::read_to_string(path)?;
    RsaPrivateKey::from_pkcs1_pem(&pem).map_err(|e| EnvelopeError::InvalidKey(e.to_string()))
}

pub fn read_public_pem(path: &Path) -> Result<RsaPublicKey, EnvelopeError> {
    let pem = fs::read_to_string(path)?;
    RsaPublicKey::from_pkcs1_pem(&pem).map_err(|e| EnvelopeError::InvalidKey(e.to_string()))
}

/// PKCS#1 PEM of a public key, for listing responses.
pub fn public_to_pem(public: &RsaPublicKey) -> Result<String, EnvelopeError> {
    public
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| EnvelopeError::InvalidKey(e.to_string()))
}
