//! The encrypt/decrypt pipeline: verify, resolve, transform, persist.
//!
//! Both paths hold the keystore reader lock for their whole run; the
//! encrypt path additionally does its duplicate check, blob write, entry
//! insert, and index flush inside one index writer critical section, so
//! two concurrent encrypts of the same path see exactly one winner.

use strongroom_envelope::symmetric;
use strongroom_keystore::KeyAlgorithm;
use strongroom_storage::{blob, ObjectKind};

use crate::error::ServiceError;
use crate::state::{now_ms, AppState};

pub struct EncryptInput {
    pub file_name: String,
    pub storage_path: String,
    pub key_id: String,
    pub overwrite: bool,
    pub plaintext: Vec<u8>,
    pub size_bytes: u64,
    pub signature: Option<Vec<u8>>,
}

pub struct EncryptOutcome {
    pub storage_path: String,
    pub file_id: String,
}

pub struct DecryptInput {
    pub path: String,
    pub key_id: String,
    pub signature: Option<Vec<u8>>,
}

pub struct DecryptOutcome {
    pub plaintext: Vec<u8>,
    pub size_bytes: u64,
    pub file_name: String,
    pub storage_path: String,
}

/// Strip one leading `./` or `/`; an emptied path becomes `/`.
pub fn normalize_storage_path(raw: &str) -> String {
    let stripped = if let Some(s) = raw.strip_prefix("./") {
        s
    } else if let Some(s) = raw.strip_prefix('/') {
        s
    } else {
        raw
    };
    if stripped.is_empty() {
        "/".to_string()
    } else {
        stripped.to_string()
    }
}

fn reject_dotdot(path: &str) -> Result<(), ServiceError> {
    if path.split('/').any(|seg| seg == "..") {
        return Err(ServiceError::InvalidPath(path.to_string()));
    }
    Ok(())
}

fn validate_file_name(name: &str) -> Result<(), ServiceError> {
    if name.is_empty() || name.contains('/') || name == ".." || name == "." {
        return Err(ServiceError::InvalidPath(name.to_string()));
    }
    Ok(())
}

/// Full logical path of an object: `/<storage_path>/<file_name>`.
fn logical_path(storage_path: &str, file_name: &str) -> String {
    let trimmed = storage_path.trim_matches('/');
    if trimmed.is_empty() {
        format!("/{}", file_name)
    } else {
        format!("/{}/{}", trimmed, file_name)
    }
}

/// Split a logical path back into `(storage_path, file_name)`.
fn split_logical(path: &str) -> (String, String) {
    match path.rfind('/') {
        Some(idx) => {
            let name = path[idx + 1..].to_string();
            let parent = &path[..idx];
            let parent = if parent.is_empty() { "/".to_string() } else { parent.to_string() };
            (parent, name)
        }
        None => ("/".to_string(), path.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Encrypt
// ---------------------------------------------------------------------------

pub async fn encrypt(
    state: &AppState,
    input: EncryptInput,
) -> Result<EncryptOutcome, ServiceError> {
    if input.key_id.is_empty() {
        return Err(ServiceError::NoKey);
    }
    validate_file_name(&input.file_name)?;

    let storage_path = normalize_storage_path(&input.storage_path);
    reject_dotdot(&storage_path)?;
    let logical = logical_path(&storage_path, &input.file_name);

    // Early duplicate check; the authoritative one happens under the
    // writer lock below.
    if !input.overwrite {
        let idx = state.index.read().await;
        if idx.doc.root.get_file(&logical).is_ok() {
            return Err(ServiceError::Duplicate(logical));
        }
    }

    let ks = state.keystore.read().await;
    let (record, _) = ks.resolve(&input.key_id)?;

    if record.algorithm == KeyAlgorithm::Ed25519 {
        let signature = input.signature.as_deref().ok_or(ServiceError::BadSignature)?;
        ks.verify_signature(record, &input.plaintext, signature)?;
    }

    let now = now_ms();
    if record.is_expired(now) {
        return Err(ServiceError::Expired(input.key_id.clone()));
    }

    let file_id = blob::file_id_for(&state.storage_root, &storage_path, &input.file_name);
    let dek = ks.data_key(&input.key_id)?;
    let envelope = symmetric::seal(&dek, &input.plaintext)?;

    // Critical section: duplicate decision, ciphertext write, index entry,
    // flush. No index entry without a successful blob write.
    let mut idx = state.index.write().await;
    if !input.overwrite && idx.doc.root.get_file(&logical).is_ok() {
        return Err(ServiceError::Duplicate(logical));
    }

    blob::write_blob(&state.storage_root, &file_id, envelope.as_bytes())?;

    let existed_before = idx.doc.root.get_file(&logical).is_ok();
    idx.doc
        .root
        .store(&file_id, &logical, input.size_bytes, ObjectKind::File, input.overwrite, now)?;

    idx.set_catalog(ks.catalog_snapshot());
    if let Err(e) = idx.persist(now) {
        // Roll the fresh entry back out; the already-written ciphertext
        // becomes a tolerated orphan.
        if !existed_before {
            let _ = idx.doc.root.remove(&logical);
        }
        tracing::warn!(path = %logical, file_id = %file_id, error = %e, "index flush failed, ciphertext orphaned");
        return Err(e.into());
    }

    tracing::info!(path = %logical, file_id = %file_id, key = %input.key_id, "encrypted object");
    Ok(EncryptOutcome { storage_path, file_id })
}

// ---------------------------------------------------------------------------
// Decrypt
// ---------------------------------------------------------------------------

pub async fn decrypt(
    state: &AppState,
    input: DecryptInput,
) -> Result<DecryptOutcome, ServiceError> {
    if input.key_id.is_empty() {
        return Err(ServiceError::NoKey);
    }

    let ks = state.keystore.read().await;
    let (record, _) = ks.resolve(&input.key_id)?;

    // The signed message is the path exactly as the client presented it.
    if record.algorithm == KeyAlgorithm::Ed25519 {
        let signature = input.signature.as_deref().ok_or(ServiceError::BadSignature)?;
        ks.verify_signature(record, input.path.as_bytes(), signature)?;
    }

    let normalized = normalize_storage_path(&input.path);
    reject_dotdot(&normalized)?;

    let entry = {
        let idx = state.index.read().await;
        idx.doc.root.get_file(&normalized)?.clone()
    };

    let envelope = blob::read_blob(&state.storage_root, &entry.file_id)?;
    let dek = ks.data_key(&input.key_id)?;
    let plaintext = symmetric::open(&dek, &envelope)?;

    let (storage_path, file_name) = split_logical(&entry.path);
    tracing::info!(path = %entry.path, key = %input.key_id, "decrypted object");

    Ok(DecryptOutcome {
        plaintext,
        size_bytes: entry.size_bytes,
        file_name,
        storage_path,
    })
}

// ---------------------------------------------------------------------------
// Entry removal
// ---------------------------------------------------------------------------

/// Remove an index entry and unlink its ciphertext. The unlink is
/// best-effort: an orphan blob is logged, never surfaced.
pub async fn remove_entry(state: &AppState, path: &str) -> Result<(), ServiceError> {
    let normalized = normalize_storage_path(path);
    reject_dotdot(&normalized)?;

    let ks = state.keystore.read().await;
    let mut idx = state.index.write().await;
    let removed = idx.doc.root.remove(&normalized)?;
    idx.set_catalog(ks.catalog_snapshot());
    idx.persist(now_ms())?;
    drop(idx);
    drop(ks);

    blob::remove_blob(&state.storage_root, &removed.file_id);
    tracing::info!(path = %removed.path, file_id = %removed.file_id, "removed object");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_rules() {
        assert_eq!(normalize_storage_path("/docs"), "docs");
        assert_eq!(normalize_storage_path("./docs"), "docs");
        assert_eq!(normalize_storage_path("docs"), "docs");
        assert_eq!(normalize_storage_path("/"), "/");
        assert_eq!(normalize_storage_path(""), "/");
        assert_eq!(normalize_storage_path("./"), "/");
    }

    #[test]
    fn logical_path_composition() {
        assert_eq!(logical_path("/", "a"), "/a");
        assert_eq!(logical_path("docs", "a.txt"), "/docs/a.txt");
        assert_eq!(logical_path("docs/deep/", "a"), "/docs/deep/a");
    }

    #[test]
    fn split_logical_inverts() {
        assert_eq!(split_logical("/docs/a.txt"), ("/docs".to_string(), "a.txt".to_string()));
        assert_eq!(split_logical("/a"), ("/".to_string(), "a".to_string()));
    }
}
