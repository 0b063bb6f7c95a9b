//! The mirror outbox: a queue of remote writes consumed by one background
//! worker.
//!
//! Entity operations enqueue a job after the local write succeeds and move
//! on; the worker applies jobs to the document store in order. Failures are
//! logged and dropped. Pausing stops consumption without dropping anything —
//! jobs enqueued while paused are held and replayed in order on resume, so
//! the remote store converges to the local state.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::MirrorError;
use crate::types::now_rfc3339;

use super::{DocumentStore, EntityKind};

// ============================================================================
// MirrorJob
// ============================================================================

#[derive(Debug)]
pub enum MirrorJob {
    /// Create-or-merge one document. `createdAt` is stamped only when the
    /// document does not exist yet.
    Upsert {
        entity: EntityKind,
        id: i64,
        fields: Value,
    },
    /// Patch an existing document; dropped (with a log line) if it is gone.
    Update {
        entity: EntityKind,
        id: i64,
        fields: Value,
    },
    /// Delete one document, cascading to its dependents.
    Delete { entity: EntityKind, id: i64 },
    /// Delete every notification document belonging to one user.
    ClearNotifications { user_id: i64 },
    /// Resolved once every job enqueued before it has been consumed.
    Flush(oneshot::Sender<()>),
}

// ============================================================================
// Outbox
// ============================================================================

#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<MirrorJob>,
    paused: Arc<watch::Sender<bool>>,
}

impl Outbox {
    /// Spawn the worker on the current runtime and return the enqueue handle.
    pub fn spawn(docs: Arc<dyn DocumentStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (paused_tx, paused_rx) = watch::channel(false);
        tokio::spawn(run_worker(rx, paused_rx, docs));
        Self {
            tx,
            paused: Arc::new(paused_tx),
        }
    }

    pub fn enqueue(&self, job: MirrorJob) {
        if self.tx.send(job).is_err() {
            log::warn!("mirror outbox worker is gone; dropping job");
        }
    }

    /// Stop consuming jobs. Enqueues still succeed and queue up.
    pub fn pause(&self) {
        let _ = self.paused.send(true);
    }

    /// Resume consumption; held jobs replay in enqueue order.
    pub fn resume(&self) {
        let _ = self.paused.send(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Restore a saved pause state (bulk operations pause, then put back
    /// whatever the caller had).
    pub fn set_paused(&self, paused: bool) {
        let _ = self.paused.send(paused);
    }

    /// Wait until everything enqueued so far has been consumed. Waits behind
    /// a pause like any other job.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(MirrorJob::Flush(done_tx)).is_err() {
            return;
        }
        let _ = done_rx.await;
    }
}

// ============================================================================
// Worker
// ============================================================================

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<MirrorJob>,
    mut paused: watch::Receiver<bool>,
    docs: Arc<dyn DocumentStore>,
) {
    while let Some(job) = rx.recv().await {
        // Hold the job (Flush included) until unpaused.
        while *paused.borrow() {
            if paused.changed().await.is_err() {
                return;
            }
        }
        match job {
            MirrorJob::Flush(done) => {
                let _ = done.send(());
            }
            job => {
                if let Err(e) = apply(docs.as_ref(), job).await {
                    log::warn!("mirror write dropped: {e}");
                }
            }
        }
    }
}

async fn apply(docs: &dyn DocumentStore, job: MirrorJob) -> Result<(), MirrorError> {
    match job {
        MirrorJob::Upsert { entity, id, fields } => {
            let collection = entity.collection();
            let doc_id = id.to_string();
            let mut fields = fields;
            if docs.get(collection, &doc_id).await?.is_none() {
                if let Value::Object(map) = &mut fields {
                    map.entry("createdAt".to_string())
                        .or_insert_with(|| Value::String(now_rfc3339()));
                }
            }
            docs.set_merge(collection, &doc_id, fields).await
        }

        MirrorJob::Update { entity, id, fields } => {
            docs.update(entity.collection(), &id.to_string(), fields).await
        }

        MirrorJob::Delete { entity, id } => {
            docs.delete(entity.collection(), &id.to_string()).await?;
            cascade_delete(docs, entity, id).await
        }

        MirrorJob::ClearNotifications { user_id } => {
            let ids = docs
                .query_eq("notifications", "userId", &json!(user_id))
                .await?;
            for doc_id in ids {
                docs.delete("notifications", &doc_id).await?;
            }
            Ok(())
        }

        // Handled in the worker loop.
        MirrorJob::Flush(_) => Ok(()),
    }
}

/// Remote-side referential cleanup. Deleting a user removes their prefs,
/// events, and friend rows (either column); deleting an event removes its
/// rsvps.
async fn cascade_delete(
    docs: &dyn DocumentStore,
    entity: EntityKind,
    id: i64,
) -> Result<(), MirrorError> {
    match entity {
        EntityKind::User => {
            for doc_id in docs.query_eq("user_prefs", "userId", &json!(id)).await? {
                docs.delete("user_prefs", &doc_id).await?;
            }
            for doc_id in docs.query_eq("events", "userId", &json!(id)).await? {
                docs.delete("events", &doc_id).await?;
            }
            for field in ["userId", "friendId"] {
                for doc_id in docs.query_eq("friends", field, &json!(id)).await? {
                    docs.delete("friends", &doc_id).await?;
                }
            }
            Ok(())
        }
        EntityKind::Event => {
            for doc_id in docs.query_eq("rsvps", "eventId", &json!(id)).await? {
                docs.delete("rsvps", &doc_id).await?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::MemoryDocumentStore;

    fn store_and_outbox() -> (Arc<MemoryDocumentStore>, Outbox) {
        let store = Arc::new(MemoryDocumentStore::new());
        let outbox = Outbox::spawn(store.clone());
        (store, outbox)
    }

    #[tokio::test]
    async fn upsert_stamps_created_at_once() {
        let (store, outbox) = store_and_outbox();
        outbox.enqueue(MirrorJob::Upsert {
            entity: EntityKind::User,
            id: 1,
            fields: json!({ "username": "ada" }),
        });
        outbox.flush().await;
        let first = store.get("users", "1").await.unwrap().unwrap();
        let created = first["createdAt"].clone();
        assert!(created.is_string());

        outbox.enqueue(MirrorJob::Upsert {
            entity: EntityKind::User,
            id: 1,
            fields: json!({ "username": "ada2" }),
        });
        outbox.flush().await;
        let second = store.get("users", "1").await.unwrap().unwrap();
        assert_eq!(second["username"], json!("ada2"));
        assert_eq!(second["createdAt"], created);
    }

    #[tokio::test]
    async fn user_delete_cascades_remotely() {
        let (store, outbox) = store_and_outbox();
        store
            .set_merge("users", "1", json!({ "username": "ada" }))
            .await
            .unwrap();
        store
            .set_merge("events", "10", json!({ "userId": 1 }))
            .await
            .unwrap();
        store
            .set_merge("friends", "20", json!({ "userId": 2, "friendId": 1 }))
            .await
            .unwrap();
        store
            .set_merge("user_prefs", "30", json!({ "userId": 1 }))
            .await
            .unwrap();

        outbox.enqueue(MirrorJob::Delete {
            entity: EntityKind::User,
            id: 1,
        });
        outbox.flush().await;

        assert!(store.get("users", "1").await.unwrap().is_none());
        assert!(store.get("events", "10").await.unwrap().is_none());
        assert!(store.get("friends", "20").await.unwrap().is_none());
        assert!(store.get("user_prefs", "30").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pause_holds_jobs_and_resume_replays_in_order() {
        let (store, outbox) = store_and_outbox();
        outbox.pause();
        outbox.enqueue(MirrorJob::Upsert {
            entity: EntityKind::User,
            id: 1,
            fields: json!({ "username": "first" }),
        });
        outbox.enqueue(MirrorJob::Upsert {
            entity: EntityKind::User,
            id: 1,
            fields: json!({ "username": "second" }),
        });

        // Nothing consumed while paused.
        tokio::task::yield_now().await;
        assert!(store.get("users", "1").await.unwrap().is_none());

        outbox.resume();
        outbox.flush().await;
        let doc = store.get("users", "1").await.unwrap().unwrap();
        assert_eq!(doc["username"], json!("second"));
    }

    #[tokio::test]
    async fn clear_notifications_only_touches_one_user() {
        let (store, outbox) = store_and_outbox();
        store
            .set_merge("notifications", "1", json!({ "userId": 7 }))
            .await
            .unwrap();
        store
            .set_merge("notifications", "2", json!({ "userId": 8 }))
            .await
            .unwrap();

        outbox.enqueue(MirrorJob::ClearNotifications { user_id: 7 });
        outbox.flush().await;

        assert!(store.get("notifications", "1").await.unwrap().is_none());
        assert!(store.get("notifications", "2").await.unwrap().is_some());
    }
}
