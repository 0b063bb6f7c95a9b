//! `StoreBackend` — the row-I/O trait both backends implement.
//!
//! The native SQLite manager and the snapshot fallback expose the same
//! surface; entity operations dispatch through `Arc<dyn StoreBackend>`
//! without knowing which one was selected at startup.
//!
//! Contract notes shared by both implementations:
//! - per-table ids are unique and strictly increasing for the lifetime of a
//!   backend + store pairing (id spaces are not reconciled across backends);
//! - lookups return `Ok(None)` / an empty vec for "not found";
//! - updates and deletes of a missing row are no-ops, never errors;
//! - `insert_*` ignores the id on the passed record and returns the
//!   generated primary key.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::types::{
    Event, EventPatch, FriendRow, FriendStatus, NewUser, Notification, PrefsPatch, Rsvp,
    RsvpStatus, User, UserPatch, UserPrefs,
};

#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Backend name for status reporting: `"sqlite"` or `"snapshot"`.
    fn name(&self) -> &'static str;

    // -----------------------------------------------------------------------
    // users
    // -----------------------------------------------------------------------

    async fn insert_user(&self, user: &NewUser) -> Result<i64, StorageError>;
    async fn user_by_id(&self, id: i64) -> Result<Option<User>, StorageError>;
    async fn user_by_firebase_uid(&self, uid: &str) -> Result<Option<User>, StorageError>;
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StorageError>;
    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StorageError>;
    async fn all_users(&self) -> Result<Vec<User>, StorageError>;
    async fn update_user(&self, id: i64, patch: &UserPatch) -> Result<(), StorageError>;
    async fn delete_user(&self, id: i64) -> Result<(), StorageError>;

    // -----------------------------------------------------------------------
    // friends
    // -----------------------------------------------------------------------

    async fn insert_friend_row(
        &self,
        user_id: i64,
        friend_id: i64,
        status: FriendStatus,
    ) -> Result<i64, StorageError>;
    async fn friend_row(&self, row_id: i64) -> Result<Option<FriendRow>, StorageError>;
    /// All rows where `user_id` appears in either column, any status.
    async fn friend_rows_for_user(&self, user_id: i64) -> Result<Vec<FriendRow>, StorageError>;
    async fn set_friend_status(
        &self,
        row_id: i64,
        status: FriendStatus,
    ) -> Result<(), StorageError>;
    async fn delete_friend_row(&self, row_id: i64) -> Result<(), StorageError>;

    // -----------------------------------------------------------------------
    // events
    // -----------------------------------------------------------------------

    async fn insert_event(&self, event: &Event) -> Result<i64, StorageError>;
    async fn event_by_id(&self, id: i64) -> Result<Option<Event>, StorageError>;
    /// All event rows owned by the user, real events and free-time alike,
    /// in storage order. Filtering and sorting happen in the entity layer.
    async fn events_for_user(&self, user_id: i64) -> Result<Vec<Event>, StorageError>;
    async fn update_event(&self, id: i64, patch: &EventPatch) -> Result<(), StorageError>;
    async fn delete_event(&self, id: i64) -> Result<(), StorageError>;

    // -----------------------------------------------------------------------
    // rsvps
    // -----------------------------------------------------------------------

    async fn insert_rsvp(&self, rsvp: &Rsvp) -> Result<i64, StorageError>;
    async fn rsvp_by_id(&self, id: i64) -> Result<Option<Rsvp>, StorageError>;
    async fn rsvps_for_event(&self, event_id: i64) -> Result<Vec<Rsvp>, StorageError>;
    /// Rows where the user is the event owner or the invite recipient.
    async fn rsvps_for_user(&self, user_id: i64) -> Result<Vec<Rsvp>, StorageError>;
    async fn set_rsvp_status(
        &self,
        id: i64,
        status: RsvpStatus,
        updated_at: &str,
    ) -> Result<(), StorageError>;
    async fn delete_rsvp(&self, id: i64) -> Result<(), StorageError>;

    // -----------------------------------------------------------------------
    // notifications
    // -----------------------------------------------------------------------

    async fn insert_notification(&self, n: &Notification) -> Result<i64, StorageError>;
    async fn notifications_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<Notification>, StorageError>;
    async fn delete_notification(&self, id: i64) -> Result<(), StorageError>;
    /// Bulk delete; returns the number of rows removed.
    async fn clear_notifications_for_user(&self, user_id: i64) -> Result<usize, StorageError>;

    // -----------------------------------------------------------------------
    // user_prefs
    // -----------------------------------------------------------------------

    async fn prefs_for_user(&self, user_id: i64) -> Result<Option<UserPrefs>, StorageError>;
    async fn insert_prefs(&self, prefs: &UserPrefs) -> Result<i64, StorageError>;
    async fn update_prefs(
        &self,
        preference_id: i64,
        patch: &PrefsPatch,
        updated_at: &str,
    ) -> Result<(), StorageError>;
    async fn delete_prefs_for_user(&self, user_id: i64) -> Result<(), StorageError>;
}
