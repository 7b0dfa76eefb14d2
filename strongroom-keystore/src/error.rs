//! Error types for the key catalog.

use std::fmt;

use strongroom_envelope::EnvelopeError;

#[derive(Debug)]
pub enum KeystoreError {
    /// A record with this name already exists.
    DuplicateName(String),
    /// Referenced key is not in the catalog.
    UnknownKey(String),
    /// Ed25519 verification failed.
    BadSignature,
    /// Stored DEK or an import package could not be decoded.
    Corrupt,
    /// Key file operation failed.
    Io(String),
    /// Invariant violation; opaque to clients.
    Internal(String),
}

impl fmt::Display for KeystoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateName(name) => write!(f, "key name already exists: {}", name),
            Self::UnknownKey(name) => write!(f, "unknown key: {}", name),
            Self::BadSignature => write!(f, "signature verification failed"),
            Self::Corrupt => write!(f, "corrupt key data"),
            Self::Io(msg) => write!(f, "key io: {}", msg),
            Self::Internal(msg) => write!(f, "internal keystore error: {}", msg),
        }
    }
}

impl std::error::Error for KeystoreError {}

impl From<std::io::Error> for KeystoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<EnvelopeError> for KeystoreError {
    fn from(e: EnvelopeError) -> Self {
        match e {
            EnvelopeError::BadSignature => Self::BadSignature,
            EnvelopeError::Corrupt => Self::Corrupt,
            EnvelopeError::Io(msg) => Self::Io(msg),
            EnvelopeError::InvalidKey(msg) | EnvelopeError::CryptoFailure(msg) => {
                Self::Internal(msg)
            }
        }
    }
}
