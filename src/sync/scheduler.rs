//! AutoSync: an immediate pull followed by fixed-interval repeats.
//!
//! `start` replaces any previous loop; `stop` halts it. A tick that lands
//! while the previous pull is still running is skipped rather than queued —
//! overlapping pulls would race each other through the same store.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::manager::SyncManager;

pub struct AutoSync {
    manager: Arc<SyncManager>,
    interval: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
    running: Arc<tokio::sync::Mutex<()>>,
}

impl AutoSync {
    pub fn new(manager: Arc<SyncManager>, interval: Duration) -> Self {
        Self {
            manager,
            interval,
            handle: Mutex::new(None),
            running: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Sync now, then every `interval`. A running loop for a previous call
    /// is stopped first.
    pub async fn start(&self, remote_user_id: i64) {
        self.stop();
        run_once(&self.manager, &self.running, remote_user_id).await;

        let manager = self.manager.clone();
        let running = self.running.clone();
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                run_once(&manager, &running, remote_user_id).await;
            }
        });
        *self.handle.lock() = Some(handle);
    }

    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for AutoSync {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_once(
    manager: &SyncManager,
    running: &tokio::sync::Mutex<()>,
    remote_user_id: i64,
) {
    let Ok(_guard) = running.try_lock() else {
        log::debug!("sync tick skipped; previous pull still running");
        return;
    };
    if let Err(e) = manager.sync_from_backend(remote_user_id).await {
        log::warn!("scheduled sync failed: {e}");
    }
}
