//! Crypto primitives for Strongroom.
//!
//! Three independent layers, kept deliberately thin:
//!
//! - [`asymmetric`]: 2048-bit RSA keypairs, PKCS#1 PEM on disk, and
//!   RSA-OAEP (SHA-256) wrapping of per-key data-encryption keys.
//! - [`symmetric`]: the AES-256-CFB envelope that every stored object
//!   uses, a fresh random IV prepended to the ciphertext and the whole
//!   thing base64-encoded.
//! - [`signing`]: Ed25519 request signatures with PKIX-PEM verifying
//!   keys.
//!
//! Callers hold key material; nothing here caches or persists state
//! beyond the explicit PEM file helpers.

mod error;

pub mod asymmetric;
pub mod signing;
pub mod symmetric;

pub use error::EnvelopeError;

// Key types callers hold on to.
pub use ed25519_dalek::{SigningKey, VerifyingKey};
pub use rsa::{RsaPrivateKey, RsaPublicKey};

/// Data-encryption keys are always AES-256.
pub const DEK_BYTES: usize = 32;

/// AES block size; CFB IVs are exactly one block.
pub const IV_BYTES: usize = 16;

/// Sample a fresh DEK from the OS CSPRNG.
pub fn generate_dek() -> Result<[u8; DEK_BYTES], EnvelopeError> {
    let mut dek = [0u8; DEK_BYTES];
    getrandom::getrandom(&mut dek).map_err(|e| EnvelopeError::CryptoFailure(e.to_string()))?;
    Ok(dek)
}
