//! Error type for the crypto layer.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Ciphertext envelope is malformed: bad base64, or shorter than one IV.
    Corrupt,
    /// Ed25519 verification failed.
    BadSignature,
    /// Key bytes or PEM could not be parsed.
    InvalidKey(String),
    /// An RSA/AES/RNG operation failed.
    CryptoFailure(String),
    /// Key file read/write failed.
    Io(String),
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupt => write!(f, "corrupt ciphertext envelope"),
            Self::BadSignature => write!(f, "signature verification failed"),
            Self::InvalidKey(msg) => write!(f, "invalid key: {}", msg),
            Self::CryptoFailure(msg) => write!(f, "crypto failure: {}", msg),
            Self::Io(msg) => write!(f, "key file io: {}", msg),
        }
    }
}

impl std::error::Error for EnvelopeError {}

impl From<std::io::Error> for EnvelopeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
