//! Flat content-addressed blob directory.
//!
//! File name is the `file_id`: hex(SHA-256) of the physical storage path
//! at creation time, so the handle survives later renames of the logical
//! path.

use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::StoreError;

/// The physical path string a `file_id` is derived from.
pub fn physical_path_string(storage_root: &Path, storage_path: &str, file_name: &str) -> String {
    let trimmed = storage_path.trim_matches('/');
    if trimmed.is_empty() {
        format!("{}/{}", storage_root.display(), file_name)
    } else {
        format!("{}/{}/{}", storage_root.display(), trimmed, file_name)
    }
}

pub fn file_id_for(storage_root: &Path, storage_path: &str, file_name: &str) -> String {
    let physical = physical_path_string(storage_root, storage_path, file_name);
    hex::encode(Sha256::digest(physical.as_bytes()))
}

/// Write a blob, replacing atomically: temp sibling then rename.
pub fn write_blob(storage_root: &Path, file_id: &str, data: &[u8]) -> Result<(), StoreError> {
    fs::create_dir_all(storage_root)?;
    let path = storage_root.join(file_id);
    let tmp = storage_root.join(format!("{}.tmp", file_id));
    fs::write(&tmp, data)?;
    fs::rename(&tmp, &path)?;
    Ok(())
}

pub fn read_blob(storage_root: &Path, file_id: &str) -> Result<Vec<u8>, StoreError> {
    let path = storage_root.join(file_id);
    if !path.is_file() {
        return Err(StoreError::NotFound(file_id.to_string()));
    }
    Ok(fs::read(&path)?)
}

/// Unlink a blob, best-effort: failure is logged, never surfaced.
pub fn remove_blob(storage_root: &Path, file_id: &str) {
    let path = storage_root.join(file_id);
    if let Err(e) = fs::remove_file(&path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to unlink blob");
        }
    }
}
