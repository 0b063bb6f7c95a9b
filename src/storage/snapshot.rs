//! SnapshotBackend — the fallback store, kept entirely in memory and
//! persisted wholesale through the key-value primitive on every mutation.
//!
//! Loading normalizes whatever blob is found under the well-known key:
//! missing or invalid table arrays become empty, malformed rows are dropped,
//! and missing per-table id counters are recomputed from the rows. A store
//! that was partially written or hand-edited loads cleanly; load never
//! surfaces an error.
//!
//! All mutations run under a single async mutex and persist before the lock
//! is released, so interleaved writers serialize instead of losing updates.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::StorageError;
use crate::types::{
    Event, EventPatch, FriendRow, FriendStatus, NewUser, Notification, PrefsPatch, Rsvp,
    RsvpStatus, User, UserPatch, UserPrefs,
};

use super::kv::KeyValueStore;
use super::traits::StoreBackend;

/// Well-known key the whole snapshot is persisted under.
pub const SNAPSHOT_KEY: &str = "huddle.db.snapshot";

/// JSON keys of the six table arrays, as they appear in the snapshot blob.
const TABLE_KEYS: [&str; 6] = [
    "users",
    "friends",
    "rsvps",
    "events",
    "userPrefs",
    "notifications",
];

// ============================================================================
// Snapshot
// ============================================================================

/// The in-memory form of the persisted store: six table arrays plus the
/// per-table next-id counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub friends: Vec<FriendRow>,
    #[serde(default)]
    pub rsvps: Vec<Rsvp>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub user_prefs: Vec<UserPrefs>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub next_ids: BTreeMap<String, i64>,
}

/// Deserialize one table array, dropping rows that no longer parse.
fn read_table<T: serde::de::DeserializeOwned>(
    obj: &serde_json::Map<String, Value>,
    key: &str,
) -> Vec<T> {
    match obj.get(key) {
        Some(Value::Array(rows)) => rows
            .iter()
            .filter_map(|row| serde_json::from_value(row.clone()).ok())
            .collect(),
        _ => Vec::new(),
    }
}

/// Recover a missing counter: `max` over numeric fields whose key ends in
/// "id" (case-insensitive) across all rows, plus one. 1 for an empty table.
fn recompute_counter(rows: Option<&Value>) -> i64 {
    let mut max = 0;
    if let Some(Value::Array(rows)) = rows {
        for row in rows {
            if let Value::Object(fields) = row {
                for (key, value) in fields {
                    if key.to_lowercase().ends_with("id") {
                        if let Some(n) = value.as_i64() {
                            max = max.max(n);
                        }
                    }
                }
            }
        }
    }
    max + 1
}

/// Normalize a raw persisted blob into a well-formed `Snapshot`.
pub fn normalize(raw: Value) -> Snapshot {
    let obj = match raw {
        Value::Object(m) => m,
        _ => serde_json::Map::new(),
    };

    let stored_counters: BTreeMap<String, i64> = obj
        .get("nextIds")
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_i64().map(|n| (k.clone(), n)))
                .collect()
        })
        .unwrap_or_default();

    let mut next_ids = BTreeMap::new();
    for table in TABLE_KEYS {
        let counter = stored_counters
            .get(table)
            .copied()
            .filter(|c| *c >= 1)
            .unwrap_or_else(|| recompute_counter(obj.get(table)));
        next_ids.insert(table.to_string(), counter);
    }

    Snapshot {
        users: read_table(&obj, "users"),
        friends: read_table(&obj, "friends"),
        rsvps: read_table(&obj, "rsvps"),
        events: read_table(&obj, "events"),
        user_prefs: read_table(&obj, "userPrefs"),
        notifications: read_table(&obj, "notifications"),
        next_ids,
    }
}

// ============================================================================
// SnapshotBackend
// ============================================================================

pub struct SnapshotBackend {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    state: Mutex<Snapshot>,
}

impl SnapshotBackend {
    /// Load (or initialize empty) from the well-known key. Never fails: a
    /// key-value read error logs a warning and starts from an empty store.
    pub async fn load(kv: Arc<dyn KeyValueStore>) -> Self {
        Self::load_with_key(kv, SNAPSHOT_KEY).await
    }

    pub async fn load_with_key(kv: Arc<dyn KeyValueStore>, key: &str) -> Self {
        let raw = match kv.get_item(key).await {
            Ok(Some(value)) => value,
            Ok(None) => Value::Null,
            Err(e) => {
                log::warn!("snapshot load failed, starting empty: {e}");
                Value::Null
            }
        };
        Self {
            kv,
            key: key.to_string(),
            state: Mutex::new(normalize(raw)),
        }
    }

    /// Current snapshot contents (test/diagnostic helper).
    pub async fn snapshot(&self) -> Snapshot {
        self.state.lock().await.clone()
    }

    async fn persist(&self, snap: &Snapshot) -> Result<(), StorageError> {
        let value = serde_json::to_value(snap)?;
        self.kv.set_item(&self.key, value).await
    }

    /// Read the counter (default 1), return it, bump the stored value.
    fn next_id(snap: &mut Snapshot, table: &str) -> i64 {
        let counter = snap.next_ids.entry(table.to_string()).or_insert(1);
        let id = *counter;
        *counter += 1;
        id
    }
}

#[async_trait]
impl StoreBackend for SnapshotBackend {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    // -----------------------------------------------------------------------
    // users
    // -----------------------------------------------------------------------

    async fn insert_user(&self, user: &NewUser) -> Result<i64, StorageError> {
        let mut snap = self.state.lock().await;
        let id = Self::next_id(&mut snap, "users");
        snap.users.push(User {
            user_id: id,
            username: user.username.clone(),
            email: user.email.clone(),
            firebase_uid: user.firebase_uid.clone(),
        });
        self.persist(&snap).await?;
        Ok(id)
    }

    async fn user_by_id(&self, id: i64) -> Result<Option<User>, StorageError> {
        let snap = self.state.lock().await;
        Ok(snap.users.iter().find(|u| u.user_id == id).cloned())
    }

    async fn user_by_firebase_uid(&self, uid: &str) -> Result<Option<User>, StorageError> {
        let snap = self.state.lock().await;
        Ok(snap
            .users
            .iter()
            .find(|u| u.firebase_uid.as_deref() == Some(uid))
            .cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        let snap = self.state.lock().await;
        Ok(snap.users.iter().find(|u| u.email == email).cloned())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        let snap = self.state.lock().await;
        Ok(snap.users.iter().find(|u| u.username == username).cloned())
    }

    async fn all_users(&self) -> Result<Vec<User>, StorageError> {
        let snap = self.state.lock().await;
        Ok(snap.users.clone())
    }

    async fn update_user(&self, id: i64, patch: &UserPatch) -> Result<(), StorageError> {
        let mut snap = self.state.lock().await;
        let Some(user) = snap.users.iter_mut().find(|u| u.user_id == id) else {
            return Ok(());
        };
        if let Some(username) = &patch.username {
            user.username = username.clone();
        }
        if let Some(email) = &patch.email {
            user.email = email.clone();
        }
        if let Some(uid) = &patch.firebase_uid {
            user.firebase_uid = Some(uid.clone());
        }
        self.persist(&snap).await
    }

    async fn delete_user(&self, id: i64) -> Result<(), StorageError> {
        let mut snap = self.state.lock().await;
        let before = snap.users.len();
        snap.users.retain(|u| u.user_id != id);
        if snap.users.len() == before {
            return Ok(());
        }
        self.persist(&snap).await
    }

    // -----------------------------------------------------------------------
    // friends
    // -----------------------------------------------------------------------

    async fn insert_friend_row(
        &self,
        user_id: i64,
        friend_id: i64,
        status: FriendStatus,
    ) -> Result<i64, StorageError> {
        let mut snap = self.state.lock().await;
        let id = Self::next_id(&mut snap, "friends");
        snap.friends.push(FriendRow {
            friend_row_id: id,
            user_id,
            friend_id,
            status,
        });
        self.persist(&snap).await?;
        Ok(id)
    }

    async fn friend_row(&self, row_id: i64) -> Result<Option<FriendRow>, StorageError> {
        let snap = self.state.lock().await;
        Ok(snap
            .friends
            .iter()
            .find(|f| f.friend_row_id == row_id)
            .cloned())
    }

    async fn friend_rows_for_user(&self, user_id: i64) -> Result<Vec<FriendRow>, StorageError> {
        let snap = self.state.lock().await;
        Ok(snap
            .friends
            .iter()
            .filter(|f| f.user_id == user_id || f.friend_id == user_id)
            .cloned()
            .collect())
    }

    async fn set_friend_status(
        &self,
        row_id: i64,
        status: FriendStatus,
    ) -> Result<(), StorageError> {
        let mut snap = self.state.lock().await;
        let Some(row) = snap.friends.iter_mut().find(|f| f.friend_row_id == row_id) else {
            return Ok(());
        };
        row.status = status;
        self.persist(&snap).await
    }

    async fn delete_friend_row(&self, row_id: i64) -> Result<(), StorageError> {
        let mut snap = self.state.lock().await;
        let before = snap.friends.len();
        snap.friends.retain(|f| f.friend_row_id != row_id);
        if snap.friends.len() == before {
            return Ok(());
        }
        self.persist(&snap).await
    }

    // -----------------------------------------------------------------------
    // events
    // -----------------------------------------------------------------------

    async fn insert_event(&self, event: &Event) -> Result<i64, StorageError> {
        let mut snap = self.state.lock().await;
        let id = Self::next_id(&mut snap, "events");
        let mut row = event.clone();
        row.event_id = id;
        snap.events.push(row);
        self.persist(&snap).await?;
        Ok(id)
    }

    async fn event_by_id(&self, id: i64) -> Result<Option<Event>, StorageError> {
        let snap = self.state.lock().await;
        Ok(snap.events.iter().find(|e| e.event_id == id).cloned())
    }

    async fn events_for_user(&self, user_id: i64) -> Result<Vec<Event>, StorageError> {
        let snap = self.state.lock().await;
        Ok(snap
            .events
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update_event(&self, id: i64, patch: &EventPatch) -> Result<(), StorageError> {
        let mut snap = self.state.lock().await;
        let Some(event) = snap.events.iter_mut().find(|e| e.event_id == id) else {
            return Ok(());
        };
        if let Some(title) = &patch.event_title {
            event.event_title = title.clone();
        }
        if let Some(description) = &patch.description {
            event.description = description.clone();
        }
        if let Some(start) = &patch.start_time {
            event.start_time = start.clone();
        }
        if let Some(end) = &patch.end_time {
            event.end_time = end.clone();
        }
        if let Some(date) = &patch.date {
            event.date = date.clone();
        }
        if let Some(recurring) = patch.recurring {
            event.recurring = recurring;
        }
        self.persist(&snap).await
    }

    async fn delete_event(&self, id: i64) -> Result<(), StorageError> {
        let mut snap = self.state.lock().await;
        let before = snap.events.len();
        snap.events.retain(|e| e.event_id != id);
        if snap.events.len() == before {
            return Ok(());
        }
        self.persist(&snap).await
    }

    // -----------------------------------------------------------------------
    // rsvps
    // -----------------------------------------------------------------------

    async fn insert_rsvp(&self, rsvp: &Rsvp) -> Result<i64, StorageError> {
        let mut snap = self.state.lock().await;
        let id = Self::next_id(&mut snap, "rsvps");
        let mut row = rsvp.clone();
        row.rsvp_id = id;
        snap.rsvps.push(row);
        self.persist(&snap).await?;
        Ok(id)
    }

    async fn rsvp_by_id(&self, id: i64) -> Result<Option<Rsvp>, StorageError> {
        let snap = self.state.lock().await;
        Ok(snap.rsvps.iter().find(|r| r.rsvp_id == id).cloned())
    }

    async fn rsvps_for_event(&self, event_id: i64) -> Result<Vec<Rsvp>, StorageError> {
        let snap = self.state.lock().await;
        Ok(snap
            .rsvps
            .iter()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn rsvps_for_user(&self, user_id: i64) -> Result<Vec<Rsvp>, StorageError> {
        let snap = self.state.lock().await;
        Ok(snap
            .rsvps
            .iter()
            .filter(|r| r.event_owner_id == user_id || r.invite_recipient_id == user_id)
            .cloned()
            .collect())
    }

    async fn set_rsvp_status(
        &self,
        id: i64,
        status: RsvpStatus,
        updated_at: &str,
    ) -> Result<(), StorageError> {
        let mut snap = self.state.lock().await;
        let Some(row) = snap.rsvps.iter_mut().find(|r| r.rsvp_id == id) else {
            return Ok(());
        };
        row.status = status;
        row.updated_at = updated_at.to_string();
        self.persist(&snap).await
    }

    async fn delete_rsvp(&self, id: i64) -> Result<(), StorageError> {
        let mut snap = self.state.lock().await;
        let before = snap.rsvps.len();
        snap.rsvps.retain(|r| r.rsvp_id != id);
        if snap.rsvps.len() == before {
            return Ok(());
        }
        self.persist(&snap).await
    }

    // -----------------------------------------------------------------------
    // notifications
    // -----------------------------------------------------------------------

    async fn insert_notification(&self, n: &Notification) -> Result<i64, StorageError> {
        let mut snap = self.state.lock().await;
        let id = Self::next_id(&mut snap, "notifications");
        let mut row = n.clone();
        row.notification_id = id;
        snap.notifications.push(row);
        self.persist(&snap).await?;
        Ok(id)
    }

    async fn notifications_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<Notification>, StorageError> {
        let snap = self.state.lock().await;
        Ok(snap
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_notification(&self, id: i64) -> Result<(), StorageError> {
        let mut snap = self.state.lock().await;
        let before = snap.notifications.len();
        snap.notifications.retain(|n| n.notification_id != id);
        if snap.notifications.len() == before {
            return Ok(());
        }
        self.persist(&snap).await
    }

    async fn clear_notifications_for_user(&self, user_id: i64) -> Result<usize, StorageError> {
        let mut snap = self.state.lock().await;
        let before = snap.notifications.len();
        snap.notifications.retain(|n| n.user_id != user_id);
        let removed = before - snap.notifications.len();
        if removed > 0 {
            self.persist(&snap).await?;
        }
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // user_prefs
    // -----------------------------------------------------------------------

    async fn prefs_for_user(&self, user_id: i64) -> Result<Option<UserPrefs>, StorageError> {
        let snap = self.state.lock().await;
        Ok(snap
            .user_prefs
            .iter()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    async fn insert_prefs(&self, prefs: &UserPrefs) -> Result<i64, StorageError> {
        let mut snap = self.state.lock().await;
        let id = Self::next_id(&mut snap, "userPrefs");
        let mut row = prefs.clone();
        row.preference_id = id;
        snap.user_prefs.push(row);
        self.persist(&snap).await?;
        Ok(id)
    }

    async fn update_prefs(
        &self,
        preference_id: i64,
        patch: &PrefsPatch,
        updated_at: &str,
    ) -> Result<(), StorageError> {
        let mut snap = self.state.lock().await;
        let Some(row) = snap
            .user_prefs
            .iter_mut()
            .find(|p| p.preference_id == preference_id)
        else {
            return Ok(());
        };
        if let Some(theme) = patch.theme {
            row.theme = Some(theme);
        }
        if let Some(enabled) = patch.notification_enabled {
            row.notification_enabled = Some(enabled);
        }
        if let Some(scheme) = &patch.color_scheme {
            row.color_scheme = Some(scheme.clone());
        }
        row.updated_at = updated_at.to_string();
        self.persist(&snap).await
    }

    async fn delete_prefs_for_user(&self, user_id: i64) -> Result<(), StorageError> {
        let mut snap = self.state.lock().await;
        let before = snap.user_prefs.len();
        snap.user_prefs.retain(|p| p.user_id != user_id);
        if snap.user_prefs.len() == before {
            return Ok(());
        }
        self.persist(&snap).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_of_null_yields_empty_store_with_unit_counters() {
        let snap = normalize(Value::Null);
        assert!(snap.users.is_empty());
        assert!(snap.notifications.is_empty());
        for table in TABLE_KEYS {
            assert_eq!(snap.next_ids[table], 1, "counter for {table}");
        }
    }

    #[test]
    fn normalize_recomputes_missing_counter_from_id_fields() {
        // No nextIds at all; the events counter must come from the rows'
        // id-suffixed numeric fields (eventId=5 and userId=9 both count).
        let raw = json!({
            "events": [
                { "eventId": 5, "userId": 9, "eventTitle": "standup" },
                { "eventId": 2, "userId": 1 }
            ]
        });
        let snap = normalize(raw);
        assert_eq!(snap.next_ids["events"], 10);
        assert_eq!(snap.next_ids["users"], 1);
        assert_eq!(snap.events.len(), 2);
    }

    #[test]
    fn normalize_keeps_valid_stored_counters() {
        let raw = json!({
            "users": [{ "userId": 1, "username": "a", "email": "a@x.com" }],
            "nextIds": { "users": 40 }
        });
        let snap = normalize(raw);
        assert_eq!(snap.next_ids["users"], 40);
    }

    #[test]
    fn normalize_drops_malformed_rows() {
        let raw = json!({
            "users": [
                { "userId": 1, "username": "a", "email": "a@x.com" },
                { "username": "no-id" },
                "not even an object"
            ]
        });
        let snap = normalize(raw);
        assert_eq!(snap.users.len(), 1);
        assert_eq!(snap.users[0].user_id, 1);
    }

    #[test]
    fn normalize_replaces_non_array_table_with_empty() {
        let raw = json!({ "friends": { "oops": true } });
        let snap = normalize(raw);
        assert!(snap.friends.is_empty());
        assert_eq!(snap.next_ids["friends"], 1);
    }

    #[tokio::test]
    async fn next_id_is_monotonic_and_persisted() {
        let kv = Arc::new(crate::storage::kv::MemoryKvStore::new());
        let backend = SnapshotBackend::load(kv.clone()).await;

        let a = backend
            .insert_user(&NewUser {
                username: "a".into(),
                email: "a@x.com".into(),
                firebase_uid: None,
            })
            .await
            .unwrap();
        let b = backend
            .insert_user(&NewUser {
                username: "b".into(),
                email: "b@x.com".into(),
                firebase_uid: None,
            })
            .await
            .unwrap();
        assert!(b > a);

        // The counter survives a reload from the same key-value store.
        let reloaded = SnapshotBackend::load(kv).await;
        let c = reloaded
            .insert_user(&NewUser {
                username: "c".into(),
                email: "c@x.com".into(),
                firebase_uid: None,
            })
            .await
            .unwrap();
        assert!(c > b);
    }

    #[tokio::test]
    async fn mutations_write_through_to_the_kv_store() {
        let kv = Arc::new(crate::storage::kv::MemoryKvStore::new());
        let backend = SnapshotBackend::load(kv.clone()).await;
        backend
            .insert_notification(&Notification {
                notification_id: 0,
                user_id: 4,
                notif_msg: "hello".into(),
                notif_type: None,
                created_at: String::new(),
            })
            .await
            .unwrap();

        let blob = kv.get_item(SNAPSHOT_KEY).await.unwrap().unwrap();
        assert_eq!(blob["notifications"][0]["userId"], json!(4));
    }
}
