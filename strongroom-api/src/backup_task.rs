//! The backup manager: a 1 Hz loop sweeping retention and snapshotting on
//! schedule, plus the quiesced snapshot and restore orchestration shared
//! with the request handlers.

use std::sync::atomic::Ordering;
use std::time::Duration;

use strongroom_keystore::Keystore;
use strongroom_storage::backup::{self, BackupEntry};

use crate::error::ServiceError;
use crate::state::{now_ms, AppState, Shared};

/// Snapshot with the index quiesced: the catalog is synced and the
/// document flushed under the index writer lock, and the lock is held
/// through the zip walk so the archived `internal.json` matches the
/// ciphertexts beside it.
pub async fn quiesced_snapshot(state: &AppState) -> Result<String, ServiceError> {
    let ks = state.keystore.read().await;
    let mut idx = state.index.write().await;
    idx.set_catalog(ks.catalog_snapshot());
    let now = now_ms();
    idx.persist(now)?;
    let name = backup::snapshot(&state.storage_root, now)?;
    Ok(name)
}

/// Restore the live store from an archive.
///
/// Sequence: safety snapshot, quiesce + flush, clear everything except
/// `backups/`, extract, reload the index and rebuild the keystore from
/// the unpacked catalog. Not transactional: a failure after the clear
/// leaves the store recoverable only via the safety snapshot, whose entry
/// is what this returns.
pub async fn restore(state: &AppState, name: &str) -> Result<BackupEntry, ServiceError> {
    let retention_ms = state.config.read().await.backup.retention_ms;

    // Both write locks for the duration: nothing may observe the store
    // between clear and reload.
    let mut ks = state.keystore.write().await;
    let mut idx = state.index.write().await;

    // Fail before touching anything if the archive is absent.
    backup::entry_for(&state.storage_root, name, retention_ms, now_ms())?;

    idx.set_catalog(ks.catalog_snapshot());
    let now = now_ms();
    idx.persist(now)?;
    let safety = backup::snapshot(&state.storage_root, now)?;
    tracing::info!(archive = %name, safety = %safety, "restoring storage from backup");

    backup::clear_storage_except_backups(&state.storage_root)?;
    backup::extract(&state.storage_root, name)?;

    idx.reload()?;
    *ks = Keystore::from_catalog(state.storage_root.join("keys"), idx.doc.key_catalog.clone());
    ks.rebuild_material();

    let entry = backup::entry_for(&state.storage_root, &safety, retention_ms, now_ms())?;
    Ok(entry)
}

/// Spawn the 1 Hz manager loop. A second call while a loop is live is a
/// no-op; the loop exits when the enable flag drops or at shutdown.
pub fn spawn_backup_loop(state: Shared) {
    if state.backup.running.swap(true, Ordering::SeqCst) {
        tracing::debug!("backup manager already running");
        return;
    }

    let mut shutdown = state.shutdown.subscribe();
    tokio::spawn(async move {
        tracing::info!("backup manager started");
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let backup_config = state.config.read().await.backup.clone();
                    if !backup_config.enable {
                        tracing::info!("backup manager disabled, exiting");
                        break;
                    }

                    if let Err(e) = backup::ensure_backup_dir(&state.storage_root) {
                        tracing::warn!(error = %e, "could not ensure backup directory");
                        continue;
                    }

                    backup::sweep_retention(
                        &state.storage_root,
                        backup_config.retention_ms,
                        now_ms(),
                    );

                    let now = now_ms();
                    let last = state.backup.last_backup_ms.load(Ordering::SeqCst);
                    if now - last >= backup_config.frequency_ms {
                        match quiesced_snapshot(&state).await {
                            Ok(name) => {
                                state.backup.last_backup_ms.store(now, Ordering::SeqCst);
                                tracing::info!(archive = %name, "scheduled backup created");
                            }
                            Err(e) => tracing::warn!(error = %e, "scheduled backup failed"),
                        }
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("backup manager shutting down");
                    break;
                }
            }
        }

        state.backup.running.store(false, Ordering::SeqCst);
    });
}
