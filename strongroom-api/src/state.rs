//! Shared server state: the guarded keystore, index, and configuration.
//!
//! Lock hierarchy: keystore before index. A task holding a keystore guard
//! (reader or writer) may take the index lock; never the reverse. Because
//! the key catalog persists inside the index document, every flush
//! snapshots the catalog under a held keystore guard and writes under the
//! index writer lock.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64};
use std::sync::Arc;

use tokio::sync::{watch, RwLock};

use strongroom_keystore::Keystore;
use strongroom_storage::StorageIndex;

use crate::config::ServerConfig;
use crate::error::ServiceError;

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Backup manager bookkeeping shared between the loop and the handlers.
pub struct BackupState {
    /// Guards against spawning a second loop while one is live.
    pub running: AtomicBool,
    pub last_backup_ms: AtomicI64,
}

pub struct AppState {
    pub keystore: RwLock<Keystore>,
    pub index: RwLock<StorageIndex>,
    pub config: RwLock<ServerConfig>,
    pub backup: BackupState,
    pub storage_root: PathBuf,
    pub config_path: PathBuf,
    /// Flipped to `true` once at shutdown; long-lived tasks subscribe.
    pub shutdown: watch::Sender<bool>,
}

pub type Shared = Arc<AppState>;

impl AppState {
    /// Build the shared state in startup order: index document, then the
    /// keystore rebuilt from the persisted catalog.
    pub fn bootstrap(
        storage_root: PathBuf,
        config: ServerConfig,
        config_path: PathBuf,
    ) -> Result<Shared, ServiceError> {
        let now = now_ms();
        let index = StorageIndex::open(&storage_root, now)?;

        let mut keystore =
            Keystore::from_catalog(storage_root.join("keys"), index.doc.key_catalog.clone());
        keystore.rebuild_material();

        let (shutdown, _) = watch::channel(false);

        Ok(Arc::new(AppState {
            keystore: RwLock::new(keystore),
            index: RwLock::new(index),
            config: RwLock::new(config),
            backup: BackupState {
                running: AtomicBool::new(false),
                last_backup_ms: AtomicI64::new(now),
            },
            storage_root,
            config_path,
            shutdown,
        }))
    }

    /// Persist the index document, catalog section included.
    pub async fn flush_index(&self) -> Result<(), ServiceError> {
        let ks = self.keystore.read().await;
        let mut idx = self.index.write().await;
        idx.set_catalog(ks.catalog_snapshot());
        idx.persist(now_ms())?;
        Ok(())
    }

    pub async fn flush_config(&self) -> Result<(), ServiceError> {
        let config = self.config.read().await;
        config.save(&self.config_path)?;
        Ok(())
    }
}
