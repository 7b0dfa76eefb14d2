//! Ed25519 request signatures.
//!
//! Verifying keys travel and persist as PKIX PEM; private seeds are
//! handed to the caller once at generation time and never stored
//! server-side.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ed25519_dalek::pkcs8::{DecodePublicKey, EncodePublicKey};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rsa::pkcs1::LineEnding;

use crate::error::EnvelopeError;

/// Sample a fresh signing keypair.
pub fn generate_signing_key() -> (SigningKey, VerifyingKey) {
    let signing = SigningKey::generate(&mut rand::rngs::OsRng);
    let verifying = signing.verifying_key();
    (signing, verifying)
}

/// PKIX PEM of a verifying key.
pub fn verifying_key_to_pem(key: &VerifyingKey) -> Result<String, EnvelopeError> {
    key.to_public_key_pem(LineEnding::LF)
        .map_err(|e| EnvelopeError::InvalidKey(e.to_string()))
}

pub fn verifying_key_from_pem(pem: &str) -> Result<VerifyingKey, EnvelopeError> {
    VerifyingKey::from_public_key_pem(pem).map_err(|e| EnvelopeError::InvalidKey(e.to_string()))
}

/// The 32-byte private seed, base64-encoded for transport.
pub fn seed_to_base64(key: &SigningKey) -> String {
    BASE64.encode(key.to_bytes())
}

/// Rebuild a signing key from a base64 seed.
pub fn signing_key_from_base64(seed_b64: &str) -> Result<SigningKey, EnvelopeError> {
    let raw = BASE64
        .decode(seed_b64.trim())
        .map_err(|e| EnvelopeError::InvalidKey(e.to_string()))?;
    let seed: [u8; 32] = raw
        .as_slice()
        .try_into()
        .map_err(|_| EnvelopeError::InvalidKey("ed25519 seed must be 32 bytes".into()))?;
    Ok(SigningKey::from_bytes(&seed))
}

/// Sign a message, returning the raw 64-byte signature.
pub fn sign(key: &SigningKey, message: &[u8]) -> Vec<u8> {
    key.sign(message).to_bytes().to_vec()
}

/// Verify `signature` over `message` against a PEM-encoded verifying key.
///
/// Every failure mode (unparsable key, malformed signature, mismatch)
/// collapses to [`EnvelopeError::BadSignature`].
pub fn verify(pem: &str, message: &[u8], signature: &[u8]) -> Result<(), EnvelopeError> {
    let key = verifying_key_from_pem(pem).map_err(|_| EnvelopeError::BadSignature)?;
    let sig = Signature::from_slice(signature).map_err(|_| EnvelopeError::BadSignature)?;
    key.verify_strict(message, &sig)
        .map_err(|_| EnvelopeError::BadSignature)
}
