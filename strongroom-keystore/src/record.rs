//! Key records and their in-memory material.

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use strongroom_envelope::{RsaPrivateKey, RsaPublicKey, DEK_BYTES};
use zeroize::Zeroize;

use crate::error::KeystoreError;

/// How a named key protects its DEK and authenticates requests.
///
/// - `Rsa`: an RSA keypair wraps the DEK (OAEP).
/// - `Ed25519`: a signature keypair authenticates requests; the DEK is
///   stored unwrapped (trusted-server mode).
/// - `None`: reserved; DEK stored unwrapped, no authentication.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAlgorithm {
    Rsa,
    Ed25519,
    None,
}

impl KeyAlgorithm {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "rsa" => Some(Self::Rsa),
            "ed25519" => Some(Self::Ed25519),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsa => write!(f, "rsa"),
            Self::Ed25519 => write!(f, "ed25519"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Persisted metadata for a named key. Lives in the catalog section of the
/// storage index document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyRecord {
    pub name: String,
    pub description: String,
    pub algorithm: KeyAlgorithm,
    /// Data cipher; currently always `"aes"`.
    pub cipher_alg: String,
    /// base64 of the OAEP-wrapped DEK (`rsa`), or of the raw DEK bytes
    /// (`ed25519`/`none`).
    pub wrapped_dek: String,
    /// base64 of the PKIX-PEM verifying key; empty unless `ed25519`.
    pub sig_public_pem: String,
    pub created_ms: i64,
    pub modified_ms: i64,
    /// Absolute wall-clock deadline in ms; `0` means never expires.
    pub expires_at_ms: i64,
}

impl KeyRecord {
    /// Expired keys are encrypt-denied but stay decrypt-enabled.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms != 0 && now_ms >= self.expires_at_ms
    }

    /// Decode the stored verifying key back to its PEM text.
    pub fn verifying_pem(&self) -> Result<String, KeystoreError> {
        let raw = BASE64
            .decode(&self.sig_public_pem)
            .map_err(|_| KeystoreError::Corrupt)?;
        String::from_utf8(raw).map_err(|_| KeystoreError::Corrupt)
    }
}

/// In-memory companion to an `rsa` record: the keypair loaded from disk
/// and the DEK recovered by unwrapping `wrapped_dek`.
pub struct KeyMaterial {
    pub private: RsaPrivateKey,
    pub public: RsaPublicKey,
    pub dek: [u8; DEK_BYTES],
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.dek.zeroize();
    }
}
