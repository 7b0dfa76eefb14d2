//! The persisted index document: key catalog + object tree in one file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strongroom_keystore::KeyRecord;

use crate::error::StoreError;
use crate::tree::DirNode;

pub const INDEX_FILE: &str = "internal.json";

/// What `internal.json` holds.
#[derive(Serialize, Deserialize)]
pub struct IndexDoc {
    pub created_ms: i64,
    pub modified_ms: i64,
    #[serde(default)]
    pub key_catalog: HashMap<String, KeyRecord>,
    #[serde(default)]
    pub root: DirNode,
}

/// The live index: the document plus its home directory. All mutation
/// goes through the owner's lock; every semantically meaningful change is
/// followed by [`StorageIndex::persist`].
pub struct StorageIndex {
    storage_root: PathBuf,
    pub doc: IndexDoc,
}

impl StorageIndex {
    /// Load `internal.json` from the storage root, creating the directory
    /// and an empty document on first run.
    pub fn open(storage_root: impl Into<PathBuf>, now_ms: i64) -> Result<Self, StoreError> {
        let storage_root = storage_root.into();
        let path = storage_root.join(INDEX_FILE);

        if path.is_file() {
            let data = fs::read_to_string(&path)?;
            let doc: IndexDoc = serde_json::from_str(&data)
                .map_err(|e| StoreError::Corrupt(format!("{}: {}", path.display(), e)))?;
            tracing::info!(path = %path.display(), "loaded index document");
            return Ok(Self { storage_root, doc });
        }

        tracing::info!(path = %path.display(), "no index document found, creating");
        fs::create_dir_all(&storage_root)?;
        let mut index = Self {
            storage_root,
            doc: IndexDoc {
                created_ms: now_ms,
                modified_ms: now_ms,
                key_catalog: HashMap::new(),
                root: DirNode::new(now_ms),
            },
        };
        index.persist(now_ms)?;
        Ok(index)
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub fn index_path(&self) -> PathBuf {
        self.storage_root.join(INDEX_FILE)
    }

    /// Replace the persisted catalog section. Callers snapshot the live
    /// keystore under its own lock before handing the map over.
    pub fn set_catalog(&mut self, catalog: HashMap<String, KeyRecord>) {
        self.doc.key_catalog = catalog;
    }

    /// Flush the document: serialize, write a temp sibling, rename.
    pub fn persist(&mut self, now_ms: i64) -> Result<(), StoreError> {
        self.doc.modified_ms = now_ms;
        let json = serde_json::to_string_pretty(&self.doc)
            .map_err(|e| StoreError::Internal(format!("serialize index: {}", e)))?;

        let path = self.index_path();
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Drop the in-memory document and re-read it from disk (used after a
    /// restore unpacks a different `internal.json`).
    pub fn reload(&mut self) -> Result<(), StoreError> {
        let path = self.index_path();
        let data = fs::read_to_string(&path)?;
        self.doc = serde_json::from_str(&data)
            .map_err(|e| StoreError::Corrupt(format!("{}: {}", path.display(), e)))?;
        tracing::info!(path = %path.display(), "reloaded index document");
        Ok(())
    }
}
