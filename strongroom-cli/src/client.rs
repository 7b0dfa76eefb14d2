//! Thin HTTP client: JSON in, JSON out, typed errors.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Error shape every server error response carries.
#[derive(Deserialize)]
struct ApiErrorBody {
    error: String,
    kind: String,
}

#[derive(Debug)]
pub enum CliError {
    /// The server answered with an error payload.
    Api { message: String, kind: String },
    /// Transport or decode failure.
    Http(String),
    /// Local validation/usage problem.
    Usage(String),
    Io(String),
}

impl CliError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Api { kind, .. } if kind == "duplicate" || kind == "duplicate_name")
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api { message, .. } => write!(f, "{}", message),
            Self::Http(msg) => write!(f, "request failed: {}", msg),
            Self::Usage(msg) => write!(f, "{}", msg),
            Self::Io(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

pub struct ApiClient {
    base: String,
    http: reqwest::blocking::Client,
}

impl ApiClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            base: format!("http://{}:{}", host, port),
            http: reqwest::blocking::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn handle<T: DeserializeOwned>(response: reqwest::blocking::Response) -> Result<T, CliError> {
        let status = response.status();
        if status.is_success() {
            return response.json::<T>().map_err(|e| CliError::Http(e.to_string()));
        }
        match response.json::<ApiErrorBody>() {
            Ok(body) => Err(CliError::Api { message: body.error, kind: body.kind }),
            Err(_) => Err(CliError::Http(format!("server returned {}", status))),
        }
    }

    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, CliError> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .map_err(|e| CliError::Http(e.to_string()))?;
        Self::handle(response)
    }

    pub fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, CliError> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .map_err(|e| CliError::Http(e.to_string()))?;
        Self::handle(response)
    }

    pub fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, CliError> {
        let response = self
            .http
            .delete(self.url(path))
            .send()
            .map_err(|e| CliError::Http(e.to_string()))?;
        Self::handle(response)
    }
}

// ---------------------------------------------------------------------------
// Response shapes (mirrors of the server wire types)
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct KeyView {
    pub name: String,
    pub description: String,
    pub algorithm: String,
    pub public_key_pem: String,
    pub created_ms: i64,
    pub modified_ms: i64,
    pub expires_at_ms: i64,
}

#[derive(Deserialize)]
pub struct GenerateKeyResponse {
    pub key: KeyView,
    #[serde(default)]
    pub ed25519_seed_b64: Option<String>,
}

#[derive(Deserialize)]
pub struct ExportKeyResponse {
    pub key_id: String,
    pub data_b64: String,
}

#[derive(Deserialize)]
pub struct EncryptResponse {
    pub storage_path: String,
    pub file_id: String,
}

#[derive(Deserialize)]
pub struct DecryptResponse {
    pub data_b64: String,
    pub size_bytes: u64,
    pub file_name: String,
    pub storage_path: String,
    pub key_id: String,
}

#[derive(Deserialize)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    pub size_bytes: u64,
    pub created_ms: i64,
    pub modified_ms: i64,
}

#[derive(Deserialize)]
pub struct BackupEntry {
    pub name: String,
    pub created_ms: i64,
    pub expires_in_ms: i64,
}

#[derive(Deserialize)]
pub struct BackupConfigView {
    pub enabled: bool,
    pub last_backup_ms: i64,
    pub total: usize,
    pub retention_ms: i64,
    pub frequency_ms: i64,
}

#[derive(Deserialize)]
pub struct ExportBackupResponse {
    pub name: String,
    pub created_ms: i64,
    pub data_b64: String,
}

#[derive(Deserialize)]
pub struct VersionResponse {
    pub version: String,
}
