//! `Db` — the handle the app holds: backend selection at open, the entity
//! operation surface (one submodule per table), and the mirror controls.
//!
//! Backend selection happens exactly once. `Db::open` probes the native
//! SQLite path when one is configured; any probe failure downgrades to the
//! snapshot fallback for the lifetime of the handle. Open never fails.

use std::path::PathBuf;
use std::sync::Arc;

use crate::mirror::{DocumentStore, Outbox};
use crate::storage::{KeyValueStore, SnapshotBackend, SqliteBackend, StoreBackend};
use crate::types::DbStatus;

pub mod events;
pub mod friends;
pub mod notifications;
pub mod preferences;
pub mod rsvps;
pub mod users;

// ============================================================================
// DbConfig
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct DbConfig {
    /// Path to the native SQLite database. `None` selects the snapshot
    /// fallback directly without probing.
    pub sqlite_path: Option<PathBuf>,
}

// ============================================================================
// Db
// ============================================================================

#[derive(Clone)]
pub struct Db {
    backend: Arc<dyn StoreBackend>,
    outbox: Outbox,
}

impl Db {
    /// Probe and select a backend, spawn the mirror outbox, and run the
    /// startup duplicate scan. Never fails: every probe problem downgrades
    /// to the snapshot store.
    pub async fn open(
        config: DbConfig,
        kv: Arc<dyn KeyValueStore>,
        docs: Arc<dyn DocumentStore>,
    ) -> Self {
        let backend: Arc<dyn StoreBackend> = match &config.sqlite_path {
            Some(path) => match SqliteBackend::open(path) {
                Ok(b) => {
                    log::info!("sqlite backend ready at {}", path.display());
                    Arc::new(b)
                }
                Err(e) => {
                    log::warn!("sqlite unavailable ({e}); falling back to snapshot store");
                    Arc::new(SnapshotBackend::load(kv).await)
                }
            },
            None => {
                log::info!("no sqlite path configured; using snapshot store");
                Arc::new(SnapshotBackend::load(kv).await)
            }
        };

        let db = Self::with_backend(backend, docs);
        db.log_startup_duplicates().await;
        db
    }

    /// Build a handle over an already-constructed backend (tests, embedding).
    pub fn with_backend(backend: Arc<dyn StoreBackend>, docs: Arc<dyn DocumentStore>) -> Self {
        Self {
            backend,
            outbox: Outbox::spawn(docs),
        }
    }

    pub fn status(&self) -> DbStatus {
        DbStatus {
            initialized: true,
            backend: self.backend.name(),
        }
    }

    // -----------------------------------------------------------------------
    // Mirror controls
    // -----------------------------------------------------------------------

    pub fn pause_mirroring(&self) {
        self.outbox.pause();
    }

    pub fn resume_mirroring(&self) {
        self.outbox.resume();
    }

    /// Wait until every mirror job enqueued so far has been consumed.
    pub async fn flush_mirror(&self) {
        self.outbox.flush().await;
    }

    pub(crate) fn backend(&self) -> &dyn StoreBackend {
        self.backend.as_ref()
    }

    pub(crate) fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Non-destructive duplicate scan run once at open; diagnostics only.
    async fn log_startup_duplicates(&self) {
        match self.backend.all_users().await {
            Ok(users) => {
                let groups = crate::dedupe::find_duplicate_groups(&users);
                if !groups.is_empty() {
                    log::warn!(
                        "duplicate scan found {} cluster(s) across {} user(s)",
                        groups.len(),
                        users.len()
                    );
                }
            }
            Err(e) => log::warn!("startup duplicate scan skipped: {e}"),
        }
    }
}
