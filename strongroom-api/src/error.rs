//! The service error taxonomy and its mapping onto the HTTP boundary.
//!
//! Core crates surface their own typed errors; everything funnels into
//! [`ServiceError`] here, and each variant carries a discrete
//! machine-readable `kind` so clients never have to pattern-match on
//! message text.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use strongroom_envelope::EnvelopeError;
use strongroom_keystore::KeystoreError;
use strongroom_storage::StoreError;

#[derive(Debug)]
pub enum ServiceError {
    /// Request arrived with an empty key id.
    NoKey,
    Duplicate(String),
    DuplicateName(String),
    UnknownKey(String),
    NotFound(String),
    BadSignature,
    Expired(String),
    InvalidPath(String),
    Corrupt(String),
    Io(String),
    Internal(String),
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoKey => "no_key",
            Self::Duplicate(_) => "duplicate",
            Self::DuplicateName(_) => "duplicate_name",
            Self::UnknownKey(_) => "unknown_key",
            Self::NotFound(_) => "not_found",
            Self::BadSignature => "bad_signature",
            Self::Expired(_) => "expired",
            Self::InvalidPath(_) => "invalid_path",
            Self::Corrupt(_) => "corrupt",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoKey | Self::InvalidPath(_) => StatusCode::BAD_REQUEST,
            Self::BadSignature => StatusCode::UNAUTHORIZED,
            Self::Expired(_) => StatusCode::FORBIDDEN,
            Self::UnknownKey(_) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Duplicate(_) | Self::DuplicateName(_) => StatusCode::CONFLICT,
            Self::Corrupt(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Io(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoKey => write!(f, "no key id supplied"),
            Self::Duplicate(what) => write!(f, "already exists: {}", what),
            Self::DuplicateName(name) => write!(f, "key name already exists: {}", name),
            Self::UnknownKey(name) => write!(f, "unknown key: {}", name),
            Self::NotFound(what) => write!(f, "not found: {}", what),
            Self::BadSignature => write!(f, "signature verification failed"),
            Self::Expired(name) => write!(f, "key expired: {}", name),
            Self::InvalidPath(path) => write!(f, "invalid path: {}", path),
            Self::Corrupt(what) => write!(f, "corrupt data: {}", what),
            // Bugs and raw IO stay opaque to clients.
            Self::Io(_) => write!(f, "internal storage failure"),
            Self::Internal(_) => write!(f, "internal error"),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<KeystoreError> for ServiceError {
    fn from(e: KeystoreError) -> Self {
        match e {
            KeystoreError::DuplicateName(name) => Self::DuplicateName(name),
            KeystoreError::UnknownKey(name) => Self::UnknownKey(name),
            KeystoreError::BadSignature => Self::BadSignature,
            KeystoreError::Corrupt => Self::Corrupt("key data".into()),
            KeystoreError::Io(msg) => Self::Io(msg),
            KeystoreError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(what) => Self::Duplicate(what),
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::InvalidPath(path) => Self::InvalidPath(path),
            StoreError::Corrupt(what) => Self::Corrupt(what),
            StoreError::Io(msg) => Self::Io(msg),
            StoreError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<EnvelopeError> for ServiceError {
    fn from(e: EnvelopeError) -> Self {
        match e {
            EnvelopeError::Corrupt => Self::Corrupt("ciphertext envelope".into()),
            EnvelopeError::BadSignature => Self::BadSignature,
            EnvelopeError::Io(msg) => Self::Io(msg),
            EnvelopeError::InvalidKey(msg) | EnvelopeError::CryptoFailure(msg) => {
                Self::Internal(msg)
            }
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Wire shape of every error response.
#[derive(Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub kind: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        if matches!(self, Self::Io(_) | Self::Internal(_)) {
            tracing::error!(error = ?self, "internal error surfaced to client");
        }
        let body = ApiError {
            error: self.to_string(),
            kind: self.kind().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
