//! Remote mirror: a document-store abstraction and the outbox that writes
//! through it.
//!
//! Local storage is the source of truth. Mirror writes are best-effort and
//! asynchronous; an unreachable or failing document store never fails an
//! entity operation.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::MirrorError;

pub mod outbox;

pub use outbox::{MirrorJob, Outbox};

// ============================================================================
// EntityKind
// ============================================================================

/// The six mirrored entity kinds, one remote collection each. Document ids
/// are the local primary keys rendered as decimal strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Friend,
    Rsvp,
    Event,
    UserPrefs,
    Notification,
}

impl EntityKind {
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Friend => "friends",
            EntityKind::Rsvp => "rsvps",
            EntityKind::Event => "events",
            EntityKind::UserPrefs => "user_prefs",
            EntityKind::Notification => "notifications",
        }
    }
}

// ============================================================================
// DocumentStore
// ============================================================================

/// Firestore-shaped surface: collections of JSON documents addressed by
/// string id, with merge-writes and single-field equality queries.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, MirrorError>;

    /// Create-or-merge: absent fields in `fields` keep their stored value.
    async fn set_merge(&self, collection: &str, id: &str, fields: Value)
        -> Result<(), MirrorError>;

    /// Patch an existing document; an absent document is an error.
    async fn update(&self, collection: &str, id: &str, fields: Value) -> Result<(), MirrorError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), MirrorError>;

    /// Ids of documents whose `field` equals `value`.
    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<String>, MirrorError>;
}

// ============================================================================
// MemoryDocumentStore
// ============================================================================

/// In-memory `DocumentStore` used in tests and on hosts with no remote
/// mirror configured.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full contents of one collection (test inspection helper).
    pub fn collection(&self, name: &str) -> BTreeMap<String, Value> {
        self.collections
            .lock()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, MirrorError> {
        Ok(self
            .collections
            .lock()
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned())
    }

    async fn set_merge(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<(), MirrorError> {
        let mut collections = self.collections.lock();
        let doc = collections
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        merge_into(doc, fields);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Value) -> Result<(), MirrorError> {
        let mut collections = self.collections.lock();
        let doc = collections
            .get_mut(collection)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| MirrorError::Store(format!("no document {collection}/{id}")))?;
        merge_into(doc, fields);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), MirrorError> {
        if let Some(c) = self.collections.lock().get_mut(collection) {
            c.remove(id);
        }
        Ok(())
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<String>, MirrorError> {
        Ok(self
            .collections
            .lock()
            .get(collection)
            .map(|c| {
                c.iter()
                    .filter(|(_, doc)| doc.get(field) == Some(value))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Shallow field merge, the way a merge-write behaves remotely.
fn merge_into(doc: &mut Value, fields: Value) {
    match (doc, fields) {
        (Value::Object(target), Value::Object(source)) => {
            for (k, v) in source {
                target.insert(k, v);
            }
        }
        (doc, fields) => *doc = fields,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_merge_keeps_absent_fields() {
        let store = MemoryDocumentStore::new();
        store
            .set_merge("users", "1", json!({ "username": "ada", "createdAt": "t0" }))
            .await
            .unwrap();
        store
            .set_merge("users", "1", json!({ "username": "ada2" }))
            .await
            .unwrap();

        let doc = store.get("users", "1").await.unwrap().unwrap();
        assert_eq!(doc["username"], json!("ada2"));
        assert_eq!(doc["createdAt"], json!("t0"));
    }

    #[tokio::test]
    async fn update_of_missing_document_errors() {
        let store = MemoryDocumentStore::new();
        let err = store.update("users", "9", json!({ "a": 1 })).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn query_eq_matches_on_one_field() {
        let store = MemoryDocumentStore::new();
        store
            .set_merge("notifications", "1", json!({ "userId": 4 }))
            .await
            .unwrap();
        store
            .set_merge("notifications", "2", json!({ "userId": 5 }))
            .await
            .unwrap();
        let hits = store
            .query_eq("notifications", "userId", &json!(4))
            .await
            .unwrap();
        assert_eq!(hits, vec!["1".to_string()]);
    }
}
