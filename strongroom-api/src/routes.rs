//! Request handlers: each route binds 1:1 to a core operation. Handlers
//! unwrap fields, call the core, and shape responses. No business rules.

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use std::sync::atomic::Ordering;

use strongroom_keystore::{KeyAlgorithm, KeyRecord};
use strongroom_storage::backup::{self, BackupEntry};
use strongroom_storage::ContentEntry;

use crate::backup_task;
use crate::error::ServiceError;
use crate::pipeline::{self, DecryptInput, EncryptInput};
use crate::state::{now_ms, Shared};

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
pub struct KeyView {
    pub name: String,
    pub description: String,
    pub algorithm: String,
    /// RSA public PEM derived from loaded material; empty otherwise.
    pub public_key_pem: String,
    pub created_ms: i64,
    pub modified_ms: i64,
    pub expires_at_ms: i64,
}

#[derive(Serialize, Deserialize)]
pub struct GenerateKeyRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Falls back to the configured default algorithm.
    #[serde(default)]
    pub algorithm: Option<String>,
    #[serde(default)]
    pub expires_in_ms: i64,
}

#[derive(Serialize, Deserialize)]
pub struct GenerateKeyResponse {
    pub key: KeyView,
    /// Returned once at generation for ed25519; never persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ed25519_seed_b64: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct ModifyKeyRequest {
    #[serde(default)]
    pub new_name: Option<String>,
    #[serde(default)]
    pub new_description: Option<String>,
    #[serde(default)]
    pub modify_expiration: bool,
    #[serde(default)]
    pub expires_in_ms: i64,
}

#[derive(Serialize, Deserialize)]
pub struct ExportKeyResponse {
    pub key_id: String,
    pub data_b64: String,
}

#[derive(Serialize, Deserialize)]
pub struct ImportKeyRequest {
    pub data_b64: String,
    #[serde(default)]
    pub force: bool,
}

#[derive(Serialize, Deserialize)]
pub struct EncryptRequest {
    pub file_name: String,
    #[serde(default)]
    pub storage_path: String,
    #[serde(default)]
    pub key_id: String,
    #[serde(default)]
    pub overwrite: bool,
    pub data_b64: String,
    /// Declared plaintext size; defaults to the decoded length.
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub signature_b64: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct EncryptResponse {
    pub storage_path: String,
    pub file_id: String,
}

#[derive(Serialize, Deserialize)]
pub struct DecryptRequest {
    pub path: String,
    #[serde(default)]
    pub key_id: String,
    #[serde(default)]
    pub signature_b64: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct DecryptResponse {
    pub data_b64: String,
    pub size_bytes: u64,
    pub file_name: String,
    pub storage_path: String,
    pub key_id: String,
}

fn default_list_path() -> String {
    "/".to_string()
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_list_path")]
    pub path: String,
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Serialize, Deserialize)]
pub struct RemoveEntryRequest {
    pub path: String,
}

#[derive(Serialize, Deserialize)]
pub struct BackupConfigView {
    pub enabled: bool,
    pub last_backup_ms: i64,
    pub total: usize,
    pub retention_ms: i64,
    pub frequency_ms: i64,
}

#[derive(Serialize, Deserialize)]
pub struct SetBackupConfigRequest {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub retention_ms: Option<i64>,
    #[serde(default)]
    pub frequency_ms: Option<i64>,
}

#[derive(Serialize, Deserialize)]
pub struct ImportBackupRequest {
    pub name: String,
    pub data_b64: String,
}

#[derive(Serialize, Deserialize)]
pub struct ExportBackupResponse {
    pub name: String,
    pub created_ms: i64,
    pub data_b64: String,
}

#[derive(Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn key_view(record: &KeyRecord, public_key_pem: String) -> KeyView {
    KeyView {
        name: record.name.clone(),
        description: record.description.clone(),
        algorithm: record.algorithm.to_string(),
        public_key_pem,
        created_ms: record.created_ms,
        modified_ms: record.modified_ms,
        expires_at_ms: record.expires_at_ms,
    }
}

fn decode_b64(field: &str, value: &str) -> Result<Vec<u8>, ServiceError> {
    BASE64
        .decode(value)
        .map_err(|_| ServiceError::Corrupt(format!("{} is not valid base64", field)))
}

fn decode_signature(value: &Option<String>) -> Result<Option<Vec<u8>>, ServiceError> {
    match value {
        Some(s) => Ok(Some(decode_b64("signature_b64", s)?)),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Key handlers
// ---------------------------------------------------------------------------

async fn get_key_names(State(state): State<Shared>) -> Json<Vec<String>> {
    let ks = state.keystore.read().await;
    Json(ks.names())
}

async fn get_keys(State(state): State<Shared>) -> Json<Vec<KeyView>> {
    let ks = state.keystore.read().await;
    let views = ks
        .records()
        .iter()
        .map(|r| key_view(r, ks.public_pem(r)))
        .collect();
    Json(views)
}

async fn generate_key(
    State(state): State<Shared>,
    Json(req): Json<GenerateKeyRequest>,
) -> Result<Json<GenerateKeyResponse>, ServiceError> {
    let algorithm_name = match &req.algorithm {
        Some(a) if !a.is_empty() => a.clone(),
        _ => state.config.read().await.default_key_algorithm.clone(),
    };
    let algorithm = KeyAlgorithm::parse(&algorithm_name)
        .ok_or_else(|| ServiceError::Internal(format!("unknown algorithm: {}", algorithm_name)))?;

    let (record, seed) = {
        let mut ks = state.keystore.write().await;
        let result = ks.generate(&req.name, &req.description, algorithm, req.expires_in_ms, now_ms());
        let (record, seed) = match result {
            Ok(ok) => ok,
            Err(e) => return Err(e.into()),
        };

        // Generation is atomic across memory, key files, and the persisted
        // catalog: a failed flush rolls the new key back out.
        let mut idx = state.index.write().await;
        idx.set_catalog(ks.catalog_snapshot());
        if let Err(e) = idx.persist(now_ms()) {
            drop(idx);
            let _ = ks.remove(&record.name);
            return Err(ServiceError::Internal(format!("catalog flush failed: {}", e)));
        }
        (record, seed)
    };

    let ks = state.keystore.read().await;
    Ok(Json(GenerateKeyResponse {
        key: key_view(&record, ks.public_pem(&record)),
        ed25519_seed_b64: seed,
    }))
}

async fn modify_key(
    State(state): State<Shared>,
    Path(key_id): Path<String>,
    Json(req): Json<ModifyKeyRequest>,
) -> Result<Json<KeyView>, ServiceError> {
    let mut ks = state.keystore.write().await;
    let record = ks.modify(
        &key_id,
        req.new_name.as_deref(),
        req.new_description.as_deref(),
        req.modify_expiration,
        req.expires_in_ms,
        now_ms(),
    )?;

    let mut idx = state.index.write().await;
    idx.set_catalog(ks.catalog_snapshot());
    idx.persist(now_ms())?;
    drop(idx);

    let pem = ks.public_pem(&record);
    Ok(Json(key_view(&record, pem)))
}

async fn remove_key(
    State(state): State<Shared>,
    Path(key_id): Path<String>,
) -> Result<Json<KeyView>, ServiceError> {
    let mut ks = state.keystore.write().await;
    let record = ks.remove(&key_id)?;

    let mut idx = state.index.write().await;
    idx.set_catalog(ks.catalog_snapshot());
    idx.persist(now_ms())?;

    Ok(Json(key_view(&record, String::new())))
}

async fn export_key(
    State(state): State<Shared>,
    Path(key_id): Path<String>,
) -> Result<Json<ExportKeyResponse>, ServiceError> {
    let ks = state.keystore.read().await;
    let blob = ks.export(&key_id)?;
    Ok(Json(ExportKeyResponse {
        key_id,
        data_b64: BASE64.encode(blob),
    }))
}

async fn import_key(
    State(state): State<Shared>,
    Path(key_id): Path<String>,
    Json(req): Json<ImportKeyRequest>,
) -> Result<Json<KeyView>, ServiceError> {
    let blob = decode_b64("data_b64", &req.data_b64)?;

    let mut ks = state.keystore.write().await;
    let record = ks.import(&key_id, &blob, req.force)?;

    let mut idx = state.index.write().await;
    idx.set_catalog(ks.catalog_snapshot());
    idx.persist(now_ms())?;
    drop(idx);

    let pem = ks.public_pem(&record);
    Ok(Json(key_view(&record, pem)))
}

// ---------------------------------------------------------------------------
// Object handlers
// ---------------------------------------------------------------------------

async fn encrypt_file(
    State(state): State<Shared>,
    Json(req): Json<EncryptRequest>,
) -> Result<Json<EncryptResponse>, ServiceError> {
    let plaintext = decode_b64("data_b64", &req.data_b64)?;
    let size_bytes = req.size_bytes.unwrap_or(plaintext.len() as u64);

    let outcome = pipeline::encrypt(
        &state,
        EncryptInput {
            file_name: req.file_name,
            storage_path: req.storage_path,
            key_id: req.key_id,
            overwrite: req.overwrite,
            plaintext,
            size_bytes,
            signature: decode_signature(&req.signature_b64)?,
        },
    )
    .await?;

    Ok(Json(EncryptResponse {
        storage_path: outcome.storage_path,
        file_id: outcome.file_id,
    }))
}

async fn decrypt_file(
    State(state): State<Shared>,
    Json(req): Json<DecryptRequest>,
) -> Result<Json<DecryptResponse>, ServiceError> {
    let key_id = req.key_id.clone();
    let outcome = pipeline::decrypt(
        &state,
        DecryptInput {
            path: req.path,
            key_id: req.key_id,
            signature: decode_signature(&req.signature_b64)?,
        },
    )
    .await?;

    Ok(Json(DecryptResponse {
        data_b64: BASE64.encode(&outcome.plaintext),
        size_bytes: outcome.size_bytes,
        file_name: outcome.file_name,
        storage_path: outcome.storage_path,
        key_id,
    }))
}

async fn list_path_contents(
    State(state): State<Shared>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ContentEntry>>, ServiceError> {
    let idx = state.index.read().await;
    let entries = idx.doc.root.list(&query.path, query.recursive)?;
    Ok(Json(entries))
}

async fn remove_entry(
    State(state): State<Shared>,
    Json(req): Json<RemoveEntryRequest>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    pipeline::remove_entry(&state, &req.path).await?;
    Ok(Json(serde_json::json!({"removed": req.path})))
}

// ---------------------------------------------------------------------------
// Backup handlers
// ---------------------------------------------------------------------------

async fn list_backups(State(state): State<Shared>) -> Result<Json<Vec<BackupEntry>>, ServiceError> {
    let retention_ms = state.config.read().await.backup.retention_ms;
    let entries = backup::list(&state.storage_root, retention_ms, now_ms())?;
    Ok(Json(entries))
}

async fn invoke_backup(State(state): State<Shared>) -> Result<Json<BackupEntry>, ServiceError> {
    let retention_ms = state.config.read().await.backup.retention_ms;
    // On-demand snapshots do not advance the scheduled clock.
    let name = backup_task::quiesced_snapshot(&state).await?;
    let entry = backup::entry_for(&state.storage_root, &name, retention_ms, now_ms())?;
    Ok(Json(entry))
}

async fn backup_config_view(state: &Shared) -> Result<BackupConfigView, ServiceError> {
    let config = state.config.read().await.backup.clone();
    let total = backup::list(&state.storage_root, config.retention_ms, now_ms())?.len();
    Ok(BackupConfigView {
        enabled: config.enable,
        last_backup_ms: state.backup.last_backup_ms.load(Ordering::SeqCst),
        total,
        retention_ms: config.retention_ms,
        frequency_ms: config.frequency_ms,
    })
}

async fn get_backup_config(
    State(state): State<Shared>,
) -> Result<Json<BackupConfigView>, ServiceError> {
    Ok(Json(backup_config_view(&state).await?))
}

async fn set_backup_config(
    State(state): State<Shared>,
    Json(req): Json<SetBackupConfigRequest>,
) -> Result<Json<BackupConfigView>, ServiceError> {
    let spawn = {
        let mut config = state.config.write().await;
        let was_enabled = config.backup.enable;
        if let Some(enabled) = req.enabled {
            config.backup.enable = enabled;
        }
        if let Some(retention_ms) = req.retention_ms {
            config.backup.retention_ms = retention_ms;
        }
        if let Some(frequency_ms) = req.frequency_ms {
            config.backup.frequency_ms = frequency_ms;
        }
        config.save(&state.config_path)?;
        config.backup.enable && !was_enabled
    };

    // false → true spawns a fresh loop; enabling while live is a no-op
    // inside the spawn guard.
    if spawn {
        backup_task::spawn_backup_loop(state.clone());
    }

    Ok(Json(backup_config_view(&state).await?))
}

async fn delete_backup(
    State(state): State<Shared>,
    Path(name): Path<String>,
) -> Result<Json<BackupEntry>, ServiceError> {
    let retention_ms = state.config.read().await.backup.retention_ms;
    let entry = backup::remove(&state.storage_root, &name, retention_ms, now_ms())?;
    Ok(Json(entry))
}

async fn export_backup(
    State(state): State<Shared>,
    Path(name): Path<String>,
) -> Result<Json<ExportBackupResponse>, ServiceError> {
    let retention_ms = state.config.read().await.backup.retention_ms;
    let entry = backup::entry_for(&state.storage_root, &name, retention_ms, now_ms())?;
    let data = backup::export(&state.storage_root, &name)?;
    Ok(Json(ExportBackupResponse {
        name: entry.name,
        created_ms: entry.created_ms,
        data_b64: BASE64.encode(data),
    }))
}

async fn import_backup(
    State(state): State<Shared>,
    Json(req): Json<ImportBackupRequest>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let data = decode_b64("data_b64", &req.data_b64)?;
    backup::import(&state.storage_root, &req.name, &data)?;
    Ok(Json(serde_json::json!({"imported": req.name})))
}

async fn restore_backup(
    State(state): State<Shared>,
    Path(name): Path<String>,
) -> Result<Json<BackupEntry>, ServiceError> {
    let safety = backup_task::restore(&state, &name).await?;
    Ok(Json(safety))
}

// ---------------------------------------------------------------------------
// Misc
// ---------------------------------------------------------------------------

async fn get_version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: Shared) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/version", get(get_version))
        .route("/api/keys/names", get(get_key_names))
        .route("/api/keys", get(get_keys).post(generate_key))
        .route("/api/keys/:id/modify", post(modify_key))
        .route("/api/keys/:id", delete(remove_key))
        .route("/api/keys/:id/export", get(export_key))
        .route("/api/keys/:id/import", post(import_key))
        .route("/api/encrypt", post(encrypt_file))
        .route("/api/decrypt", post(decrypt_file))
        .route("/api/storage", get(list_path_contents))
        .route("/api/storage/remove", post(remove_entry))
        .route("/api/backups", get(list_backups))
        .route("/api/backups/invoke", post(invoke_backup))
        .route("/api/backups/config", get(get_backup_config).post(set_backup_config))
        .route("/api/backups/:name", delete(delete_backup))
        .route("/api/backups/:name/export", get(export_backup))
        .route("/api/backups/:name/restore", post(restore_backup))
        .route("/api/backups/import", post(import_backup))
        .layer(cors)
        .with_state(state)
}
