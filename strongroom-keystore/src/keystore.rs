//! The key catalog and its lifecycle operations.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use strongroom_envelope::{asymmetric, generate_dek, signing, DEK_BYTES};

use crate::error::KeystoreError;
use crate::record::{KeyAlgorithm, KeyMaterial, KeyRecord};

// ---------------------------------------------------------------------------
// Export package
// ---------------------------------------------------------------------------

/// What `export` serializes and `import` consumes: the catalog record plus
/// the raw PEM files, gzip-compressed as JSON. PEM bytes travel base64.
#[derive(Serialize, Deserialize)]
pub struct KeyExportPackage {
    pub record: KeyRecord,
    pub private_pem_b64: String,
    pub public_pem_b64: String,
}

// ---------------------------------------------------------------------------
// Keystore
// ---------------------------------------------------------------------------

/// Authoritative catalog of key records and their in-memory material.
///
/// Mutations touch up to three surfaces (the record map, the material
/// map, and the PEM files under `keys_dir`) and keep them in sync.
/// Persisting the catalog itself is the caller's job (it lives inside the
/// storage index document).
pub struct Keystore {
    keys_dir: PathBuf,
    records: HashMap<String, KeyRecord>,
    material: HashMap<String, KeyMaterial>,
    // Insertion order for deterministic listings.
    order: Vec<String>,
}

impl Keystore {
    pub fn new(keys_dir: impl Into<PathBuf>) -> Self {
        Self {
            keys_dir: keys_dir.into(),
            records: HashMap::new(),
            material: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Rebuild from a persisted catalog. Listing order restarts
    /// name-sorted since the on-disk map carries no order.
    pub fn from_catalog(
        keys_dir: impl Into<PathBuf>,
        catalog: HashMap<String, KeyRecord>,
    ) -> Self {
        let mut order: Vec<String> = catalog.keys().cloned().collect();
        order.sort();
        Self {
            keys_dir: keys_dir.into(),
            records: catalog,
            material: HashMap::new(),
            order,
        }
    }

    pub fn keys_dir(&self) -> &Path {
        &self.keys_dir
    }

    /// Reload RSA material from disk: parse the PEM keypair, unwrap the
    /// stored DEK. Records whose files are missing or unreadable are
    /// skipped with a warning; the catalog entry stays (decrypt of their
    /// objects will fail until the files return).
    pub fn rebuild_material(&mut self) {
        let names: Vec<String> = self.order.clone();
        for name in names {
            let record = match self.records.get(&name) {
                Some(r) if r.algorithm == KeyAlgorithm::Rsa => r.clone(),
                _ => continue,
            };
            match self.load_material(&record) {
                Ok(material) => {
                    self.material.insert(name, material);
                }
                Err(e) => {
                    tracing::warn!(key = %name, error = %e, "skipping key material rebuild");
                }
            }
        }
        tracing::info!(
            keys = self.records.len(),
            material = self.material.len(),
            "key catalog loaded"
        );
    }

    fn load_material(&self, record: &KeyRecord) -> Result<KeyMaterial, KeystoreError> {
        let (sk_path, pk_path) = asymmetric::key_file_paths(&self.keys_dir, &record.name);
        let private = asymmetric::read_private_pem(&sk_path)?;
        let public = match asymmetric::read_public_pem(&pk_path) {
            Ok(pk) => pk,
            Err(e) => {
                tracing::warn!(key = %record.name, error = %e, "public key file unreadable, deriving from private");
                strongroom_envelope::RsaPublicKey::from(&private)
            }
        };
        let dek = asymmetric::unwrap_dek(&private, &record.wrapped_dek)?;
        Ok(KeyMaterial { private, public, dek })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    /// Key names in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Record snapshots in insertion order.
    pub fn records(&self) -> Vec<KeyRecord> {
        self.order
            .iter()
            .filter_map(|n| self.records.get(n).cloned())
            .collect()
    }

    /// Owned copy of the catalog, for persistence.
    pub fn catalog_snapshot(&self) -> HashMap<String, KeyRecord> {
        self.records.clone()
    }

    pub fn resolve(
        &self,
        name: &str,
    ) -> Result<(&KeyRecord, Option<&KeyMaterial>), KeystoreError> {
        let record = self
            .records
            .get(name)
            .ok_or_else(|| KeystoreError::UnknownKey(name.to_string()))?;
        Ok((record, self.material.get(name)))
    }

    /// Exported RSA public PEM for a record; empty when no material is
    /// loaded (non-RSA keys, or files missing at startup).
    pub fn public_pem(&self, record: &KeyRecord) -> String {
        self.material
            .get(&record.name)
            .and_then(|m| asymmetric::public_to_pem(&m.public).ok())
            .unwrap_or_default()
    }

    /// The working AES key for a record.
    pub fn data_key(&self, name: &str) -> Result<[u8; DEK_BYTES], KeystoreError> {
        let (record, material) = self.resolve(name)?;
        match record.algorithm {
            KeyAlgorithm::Rsa => {
                let material = material.ok_or_else(|| {
                    KeystoreError::Internal(format!("no material loaded for key '{}'", name))
                })?;
                Ok(material.dek)
            }
            KeyAlgorithm::Ed25519 | KeyAlgorithm::None => {
                let raw = BASE64
                    .decode(&record.wrapped_dek)
                    .map_err(|_| KeystoreError::Corrupt)?;
                raw.as_slice().try_into().map_err(|_| KeystoreError::Corrupt)
            }
        }
    }

    /// Verify an Ed25519 request signature against a record's stored
    /// verifying key.
    pub fn verify_signature(
        &self,
        record: &KeyRecord,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), KeystoreError> {
        let pem = record.verifying_pem().map_err(|_| KeystoreError::BadSignature)?;
        signing::verify(&pem, message, signature).map_err(|_| KeystoreError::BadSignature)
    }

    // -----------------------------------------------------------------------
    // Generate
    // -----------------------------------------------------------------------

    /// Generate a new named key. For `ed25519` the base64 private seed is
    /// returned alongside the record and is never persisted.
    pub fn generate(
        &mut self,
        name: &str,
        description: &str,
        algorithm: KeyAlgorithm,
        expires_in_ms: i64,
        now_ms: i64,
    ) -> Result<(KeyRecord, Option<String>), KeystoreError> {
        if name.is_empty() {
            return Err(KeystoreError::Internal("key name must not be empty".into()));
        }
        if self.records.contains_key(name) {
            return Err(KeystoreError::DuplicateName(name.to_string()));
        }

        let dek = generate_dek()?;
        let mut material = None;
        let mut seed_b64 = None;
        let mut sig_public_pem = String::new();

        let wrapped_dek = match algorithm {
            KeyAlgorithm::Rsa => {
                let (private, public) = asymmetric::generate_keypair()?;
                asymmetric::write_keypair_pem(&self.keys_dir, name, &private)?;
                let wrapped = asymmetric::wrap_dek(&public, &dek)?;
                material = Some(KeyMaterial { private, public, dek });
                wrapped
            }
            KeyAlgorithm::Ed25519 => {
                let (signing_key, verifying_key) = signing::generate_signing_key();
                let pem = signing::verifying_key_to_pem(&verifying_key)?;
                sig_public_pem = BASE64.encode(pem.as_bytes());
                seed_b64 = Some(signing::seed_to_base64(&signing_key));
                tracing::warn!(key = %name, "ed25519 key stores its DEK unwrapped");
                BASE64.encode(dek)
            }
            KeyAlgorithm::None => {
                tracing::warn!(key = %name, "algorithm 'none' stores its DEK unwrapped");
                BASE64.encode(dek)
            }
        };

        let record = KeyRecord {
            name: name.to_string(),
            description: description.to_string(),
            algorithm,
            cipher_alg: "aes".to_string(),
            wrapped_dek,
            sig_public_pem,
            created_ms: now_ms,
            modified_ms: now_ms,
            expires_at_ms: if expires_in_ms == 0 { 0 } else { now_ms + expires_in_ms },
        };

        self.records.insert(name.to_string(), record.clone());
        self.order.push(name.to_string());
        if let Some(m) = material {
            self.material.insert(name.to_string(), m);
        }

        tracing::info!(key = %name, algorithm = %algorithm, "generated key");
        Ok((record, seed_b64))
    }

    // -----------------------------------------------------------------------
    // Modify
    // -----------------------------------------------------------------------

    /// Rename and/or re-describe a key, optionally resetting its expiry.
    /// A rename moves the record map entry, the material map entry, and
    /// both PEM files together; a failed file rename leaves everything
    /// untouched.
    pub fn modify(
        &mut self,
        key_id: &str,
        new_name: Option<&str>,
        new_description: Option<&str>,
        modify_expiration: bool,
        expires_in_ms: i64,
        now_ms: i64,
    ) -> Result<KeyRecord, KeystoreError> {
        if !self.records.contains_key(key_id) {
            return Err(KeystoreError::UnknownKey(key_id.to_string()));
        }

        let mut current_name = key_id.to_string();

        if let Some(target) = new_name.filter(|n| *n != key_id) {
            if target.is_empty() {
                return Err(KeystoreError::Internal("key name must not be empty".into()));
            }
            if self.records.contains_key(target) {
                return Err(KeystoreError::DuplicateName(target.to_string()));
            }

            self.rename_key_files(key_id, target)?;

            let mut record = self.records.remove(key_id).ok_or_else(|| {
                KeystoreError::Internal(format!("record vanished during rename: {}", key_id))
            })?;
            record.name = target.to_string();
            self.records.insert(target.to_string(), record);

            if let Some(m) = self.material.remove(key_id) {
                self.material.insert(target.to_string(), m);
            }
            if let Some(slot) = self.order.iter_mut().find(|n| n.as_str() == key_id) {
                *slot = target.to_string();
            }
            current_name = target.to_string();
        }

        let record = self.records.get_mut(&current_name).ok_or_else(|| {
            KeystoreError::Internal(format!("record vanished during modify: {}", current_name))
        })?;

        if let Some(desc) = new_description {
            record.description = desc.to_string();
        }
        if modify_expiration {
            record.expires_at_ms = if expires_in_ms == 0 { 0 } else { now_ms + expires_in_ms };
        }
        record.modified_ms = now_ms;

        tracing::info!(key = %current_name, "modified key");
        Ok(record.clone())
    }

    fn rename_key_files(&self, from: &str, to: &str) -> Result<(), KeystoreError> {
        let (sk_from, pk_from) = asymmetric::key_file_paths(&self.keys_dir, from);
        if !sk_from.exists() {
            return Ok(());
        }
        let (sk_to, pk_to) = asymmetric::key_file_paths(&self.keys_dir, to);

        std::fs::rename(&sk_from, &sk_to)
            .map_err(|e| KeystoreError::Internal(format!("rename private key: {}", e)))?;
        if let Err(e) = std::fs::rename(&pk_from, &pk_to) {
            // Undo the first rename so the pair stays consistent.
            let _ = std::fs::rename(&sk_to, &sk_from);
            return Err(KeystoreError::Internal(format!("rename public key: {}", e)));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Remove
    // -----------------------------------------------------------------------

    /// Remove a key: record, material, and PEM files. Returns the removed
    /// record for the audit echo.
    pub fn remove(&mut self, key_id: &str) -> Result<KeyRecord, KeystoreError> {
        let record = self
            .records
            .remove(key_id)
            .ok_or_else(|| KeystoreError::UnknownKey(key_id.to_string()))?;
        self.material.remove(key_id);
        self.order.retain(|n| n != key_id);

        if record.algorithm == KeyAlgorithm::Rsa {
            let (sk_path, pk_path) = asymmetric::key_file_paths(&self.keys_dir, key_id);
            for path in [sk_path, pk_path] {
                if let Err(e) = std::fs::remove_file(&path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(path = %path.display(), error = %e, "failed to delete key file");
                    }
                }
            }
        }

        tracing::info!(key = %key_id, "removed key");
        Ok(record)
    }

    // -----------------------------------------------------------------------
    // Export / import
    // -----------------------------------------------------------------------

    /// Serialize a key as gzip(JSON(record + raw PEM files)).
    pub fn export(&self, key_id: &str) -> Result<Vec<u8>, KeystoreError> {
        let record = self
            .records
            .get(key_id)
            .ok_or_else(|| KeystoreError::UnknownKey(key_id.to_string()))?;

        let (sk_path, pk_path) = asymmetric::key_file_paths(&self.keys_dir, key_id);
        let private_pem = if sk_path.exists() { std::fs::read(&sk_path)? } else { Vec::new() };
        let public_pem = if pk_path.exists() { std::fs::read(&pk_path)? } else { Vec::new() };

        let package = KeyExportPackage {
            record: record.clone(),
            private_pem_b64: BASE64.encode(private_pem),
            public_pem_b64: BASE64.encode(public_pem),
        };
        let json = serde_json::to_vec(&package)
            .map_err(|e| KeystoreError::Internal(format!("serialize export: {}", e)))?;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)?;
        let blob = encoder.finish()?;

        tracing::info!(key = %key_id, bytes = blob.len(), "exported key");
        Ok(blob)
    }

    /// Import a previously exported key under `key_id`, overwriting only
    /// when `force` is set. PEM files are written back to disk as-is; the
    /// wrapped DEK is not re-validated.
    pub fn import(
        &mut self,
        key_id: &str,
        blob: &[u8],
        force: bool,
    ) -> Result<KeyRecord, KeystoreError> {
        if self.records.contains_key(key_id) && !force {
            return Err(KeystoreError::DuplicateName(key_id.to_string()));
        }

        let mut decoder = GzDecoder::new(blob);
        let mut json = Vec::new();
        decoder
            .read_to_end(&mut json)
            .map_err(|_| KeystoreError::Corrupt)?;
        let package: KeyExportPackage =
            serde_json::from_slice(&json).map_err(|_| KeystoreError::Corrupt)?;

        let mut record = package.record;
        record.name = key_id.to_string();

        let private_pem = BASE64
            .decode(&package.private_pem_b64)
            .map_err(|_| KeystoreError::Corrupt)?;
        let public_pem = BASE64
            .decode(&package.public_pem_b64)
            .map_err(|_| KeystoreError::Corrupt)?;

        if !private_pem.is_empty() {
            std::fs::create_dir_all(&self.keys_dir)?;
            let (sk_path, pk_path) = asymmetric::key_file_paths(&self.keys_dir, key_id);
            std::fs::write(&sk_path, &private_pem)?;
            std::fs::write(&pk_path, &public_pem)?;
        }

        let is_new = !self.records.contains_key(key_id);
        self.records.insert(key_id.to_string(), record.clone());
        if is_new {
            self.order.push(key_id.to_string());
        }

        if record.algorithm == KeyAlgorithm::Rsa {
            match self.load_material(&record) {
                Ok(m) => {
                    self.material.insert(key_id.to_string(), m);
                }
                Err(e) => {
                    tracing::warn!(key = %key_id, error = %e, "imported key has no usable material");
                    self.material.remove(key_id);
                }
            }
        }

        tracing::info!(key = %key_id, "imported key");
        Ok(record)
    }
}
