//! Backup engine: zip snapshots of the storage tree, retention sweeps,
//! archive management, and the destructive half of restore.
//!
//! The 1 Hz scheduling loop lives in the server; everything here is a
//! synchronous filesystem operation over the storage root.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::StoreError;

pub const BACKUP_DIR: &str = "backups";

/// A snapshot archive as reported to clients.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackupEntry {
    pub name: String,
    /// Archive mtime in ms.
    pub created_ms: i64,
    /// `retention_ms - (now - mtime)`; negative once overdue for the sweep.
    pub expires_in_ms: i64,
}

pub fn backup_dir(storage_root: &Path) -> PathBuf {
    storage_root.join(BACKUP_DIR)
}

pub fn ensure_backup_dir(storage_root: &Path) -> Result<PathBuf, StoreError> {
    let dir = backup_dir(storage_root);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Archive names are plain file names; anything that could traverse out
/// of the backups directory is rejected.
fn validate_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name == ".." || name.contains('/') || name.contains('\\') {
        return Err(StoreError::InvalidPath(name.to_string()));
    }
    Ok(())
}

fn mtime_ms(path: &Path) -> Result<i64, StoreError> {
    let modified = fs::metadata(path)?.modified()?;
    let ms = modified
        .duration_since(UNIX_EPOCH)
        .map_err(|e| StoreError::Internal(format!("mtime before epoch: {}", e)))?
        .as_millis() as i64;
    Ok(ms)
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Zip every regular file under the storage root, excluding the backups
/// subtree, into `backups/storage_<now_ms>.zip`. Entry names are
/// relative to the storage root.
pub fn snapshot(storage_root: &Path, now_ms: i64) -> Result<String, StoreError> {
    let dir = ensure_backup_dir(storage_root)?;
    let name = format!("storage_{}.zip", now_ms);
    let archive_path = dir.join(&name);

    let file = fs::File::create(&archive_path)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let walk = WalkDir::new(storage_root)
        .into_iter()
        .filter_entry(|e| {
            !(e.depth() == 1 && e.file_type().is_dir() && e.file_name().to_str() == Some(BACKUP_DIR))
        });

    for entry in walk {
        let entry = entry.map_err(|e| StoreError::Io(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(storage_root)
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        let data = fs::read(entry.path())?;

        tracing::debug!(entry = %rel.display(), bytes = data.len(), "zipping");
        writer.start_file(rel.to_string_lossy().into_owned(), options)?;
        writer.write_all(&data)?;
    }

    writer.finish()?;
    tracing::info!(archive = %archive_path.display(), "snapshot created");
    Ok(name)
}

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

/// Delete every archive older than the retention period. Returns how many
/// were removed; individual failures are logged and skipped.
pub fn sweep_retention(storage_root: &Path, retention_ms: i64, now_ms: i64) -> usize {
    let dir = backup_dir(storage_root);
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let age_ms = match mtime_ms(&path) {
            Ok(mtime) => now_ms - mtime,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping retention check");
                continue;
            }
        };
        if age_ms >= retention_ms {
            tracing::info!(path = %path.display(), age_ms, "removing retention-expired backup");
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove backup"),
            }
        }
    }
    removed
}

// ---------------------------------------------------------------------------
// Archive management
// ---------------------------------------------------------------------------

fn entry_from_path(path: &Path, retention_ms: i64, now_ms: i64) -> Result<BackupEntry, StoreError> {
    let mtime = mtime_ms(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| StoreError::Internal(format!("nameless path: {}", path.display())))?;
    Ok(BackupEntry {
        name,
        created_ms: mtime,
        expires_in_ms: retention_ms - (now_ms - mtime),
    })
}

/// Enumerate archives, name-sorted.
pub fn list(
    storage_root: &Path,
    retention_ms: i64,
    now_ms: i64,
) -> Result<Vec<BackupEntry>, StoreError> {
    let dir = backup_dir(storage_root);
    let mut out = Vec::new();
    if !dir.is_dir() {
        return Ok(out);
    }
    for entry in fs::read_dir(&dir)?.flatten() {
        let path = entry.path();
        if path.is_file() {
            out.push(entry_from_path(&path, retention_ms, now_ms)?);
        }
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}

pub fn entry_for(
    storage_root: &Path,
    name: &str,
    retention_ms: i64,
    now_ms: i64,
) -> Result<BackupEntry, StoreError> {
    validate_name(name)?;
    let path = backup_dir(storage_root).join(name);
    if !path.is_file() {
        return Err(StoreError::NotFound(name.to_string()));
    }
    entry_from_path(&path, retention_ms, now_ms)
}

/// Unlink an archive, returning its final listing row.
pub fn remove(
    storage_root: &Path,
    name: &str,
    retention_ms: i64,
    now_ms: i64,
) -> Result<BackupEntry, StoreError> {
    let entry = entry_for(storage_root, name, retention_ms, now_ms)?;
    fs::remove_file(backup_dir(storage_root).join(name))?;
    tracing::info!(archive = %name, "removed backup");
    Ok(entry)
}

pub fn export(storage_root: &Path, name: &str) -> Result<Vec<u8>, StoreError> {
    validate_name(name)?;
    let path = backup_dir(storage_root).join(name);
    if !path.is_file() {
        return Err(StoreError::NotFound(name.to_string()));
    }
    Ok(fs::read(&path)?)
}

pub fn import(storage_root: &Path, name: &str, data: &[u8]) -> Result<(), StoreError> {
    validate_name(name)?;
    let dir = ensure_backup_dir(storage_root)?;
    let path = dir.join(name);
    if path.exists() {
        return Err(StoreError::Duplicate(name.to_string()));
    }
    fs::write(&path, data)?;
    tracing::info!(archive = %name, bytes = data.len(), "imported backup");
    Ok(())
}

// ---------------------------------------------------------------------------
// Restore plumbing
// ---------------------------------------------------------------------------

/// Delete everything directly under the storage root except the backups
/// directory. The index must be quiesced first; this is the
/// point-of-no-return half of restore.
pub fn clear_storage_except_backups(storage_root: &Path) -> Result<(), StoreError> {
    for entry in fs::read_dir(storage_root)?.flatten() {
        if entry.file_name() == BACKUP_DIR {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Unpack an archive into the storage root.
pub fn extract(storage_root: &Path, name: &str) -> Result<(), StoreError> {
    validate_name(name)?;
    let path = backup_dir(storage_root).join(name);
    if !path.is_file() {
        return Err(StoreError::NotFound(name.to_string()));
    }
    let file = fs::File::open(&path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    archive.extract(storage_root)?;
    tracing::info!(archive = %name, "extracted backup into storage root");
    Ok(())
}
