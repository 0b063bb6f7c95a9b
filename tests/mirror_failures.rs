//! Mirror isolation: a broken remote store never fails a local operation,
//! and a healthy one converges to local state.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use huddle_db::{
    Db, DocumentStore, MemoryDocumentStore, MirrorError, NewEvent, NewRsvp, NewUser, PrefsPatch,
    RsvpStatus, SqliteBackend,
};

// ============================================================================
// Test helpers
// ============================================================================

/// A document store where every call fails.
struct BrokenDocumentStore;

#[async_trait]
impl DocumentStore for BrokenDocumentStore {
    async fn get(&self, _: &str, _: &str) -> Result<Option<Value>, MirrorError> {
        Err(MirrorError::Store("unreachable".to_string()))
    }
    async fn set_merge(&self, _: &str, _: &str, _: Value) -> Result<(), MirrorError> {
        Err(MirrorError::Store("unreachable".to_string()))
    }
    async fn update(&self, _: &str, _: &str, _: Value) -> Result<(), MirrorError> {
        Err(MirrorError::Store("unreachable".to_string()))
    }
    async fn delete(&self, _: &str, _: &str) -> Result<(), MirrorError> {
        Err(MirrorError::Store("unreachable".to_string()))
    }
    async fn query_eq(&self, _: &str, _: &str, _: &Value) -> Result<Vec<String>, MirrorError> {
        Err(MirrorError::Store("unreachable".to_string()))
    }
}

fn db_with(docs: Arc<dyn DocumentStore>) -> Db {
    Db::with_backend(
        Arc::new(SqliteBackend::open_in_memory().expect("open in-memory DB")),
        docs,
    )
}

fn new_user(name: &str) -> NewUser {
    NewUser {
        username: name.to_string(),
        email: format!("{name}@x.com"),
        firebase_uid: None,
    }
}

// ============================================================================
// Failure isolation
// ============================================================================

#[tokio::test]
async fn every_local_operation_succeeds_against_a_broken_mirror() {
    let db = db_with(Arc::new(BrokenDocumentStore));

    let user = db.create_user(new_user("ada")).await.unwrap();
    let other = db.create_user(new_user("bob")).await.unwrap();
    let event = db
        .create_event(NewEvent {
            user_id: user.user_id,
            ..Default::default()
        })
        .await
        .unwrap();
    let rsvp = db
        .create_rsvp(NewRsvp {
            event_id: event.event_id,
            event_owner_id: user.user_id,
            invite_recipient_id: other.user_id,
            status: RsvpStatus::Pending,
        })
        .await
        .unwrap();
    db.update_rsvp(rsvp.rsvp_id, RsvpStatus::Accepted)
        .await
        .unwrap();
    let row = db
        .send_friend_request(user.user_id, other.user_id)
        .await
        .unwrap();
    db.respond_friend_request(row.friend_row_id, true)
        .await
        .unwrap();
    db.create_notification(user.user_id, "hi".to_string(), None)
        .await
        .unwrap();
    db.set_user_preferences(
        user.user_id,
        PrefsPatch {
            theme: Some(1),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    db.delete_event(event.event_id).await.unwrap();
    db.delete_user(other.user_id).await.unwrap();

    // The queue drains (dropping each failed job) rather than wedging.
    db.flush_mirror().await;
    assert!(db.get_user_by_id(user.user_id).await.unwrap().is_some());
}

#[tokio::test]
async fn merge_still_completes_against_a_broken_mirror() {
    let db = db_with(Arc::new(BrokenDocumentStore));
    let keep = db
        .create_user(NewUser {
            firebase_uid: Some("uid".to_string()),
            ..new_user("ada")
        })
        .await
        .unwrap();
    let dup = db.create_user(new_user("ada2")).await.unwrap();
    db.create_notification(dup.user_id, "n".to_string(), None)
        .await
        .unwrap();

    let report = db.merge_users(keep.user_id, dup.user_id).await.unwrap();
    assert!(report.user_deleted);
    assert!(report.is_clean());
}

// ============================================================================
// Convergence with a healthy mirror
// ============================================================================

#[tokio::test]
async fn local_writes_converge_into_the_document_store() {
    let docs = Arc::new(MemoryDocumentStore::new());
    let db = db_with(docs.clone());

    let user = db.create_user(new_user("ada")).await.unwrap();
    db.create_notification(user.user_id, "hi".to_string(), None)
        .await
        .unwrap();
    db.flush_mirror().await;

    let doc = docs
        .get("users", &user.user_id.to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc["username"], json!("ada"));
    assert!(doc["createdAt"].is_string());
    assert_eq!(docs.collection("notifications").len(), 1);

    db.delete_user(user.user_id).await.unwrap();
    db.flush_mirror().await;
    assert!(docs
        .get("users", &user.user_id.to_string())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn paused_mirror_holds_writes_until_resume() {
    let docs = Arc::new(MemoryDocumentStore::new());
    let db = db_with(docs.clone());

    db.pause_mirroring();
    let user = db.create_user(new_user("ada")).await.unwrap();
    tokio::task::yield_now().await;
    assert!(docs
        .get("users", &user.user_id.to_string())
        .await
        .unwrap()
        .is_none());

    db.resume_mirroring();
    db.flush_mirror().await;
    assert!(docs
        .get("users", &user.user_id.to_string())
        .await
        .unwrap()
        .is_some());
}
