//! Typed records for the six logical tables, plus the patch/input structs
//! the entity operations accept.
//!
//! Field names serialize as camelCase so snapshots and mirror documents keep
//! the shape the app has always persisted. Unknown fields in persisted data
//! are ignored on deserialize; the typed structs are the schema.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp format used everywhere a row or document is stamped.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============================================================================
// Status enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendStatus {
    Pending,
    Accepted,
    Rejected,
}

impl FriendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FriendStatus::Pending => "pending",
            FriendStatus::Accepted => "accepted",
            FriendStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FriendStatus::Pending),
            "accepted" => Some(FriendStatus::Accepted),
            "rejected" => Some(FriendStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RsvpStatus {
    NoReply,
    Pending,
    Accepted,
    Declined,
}

impl RsvpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RsvpStatus::NoReply => "no-reply",
            RsvpStatus::Pending => "pending",
            RsvpStatus::Accepted => "accepted",
            RsvpStatus::Declined => "declined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "no-reply" => Some(RsvpStatus::NoReply),
            "pending" => Some(RsvpStatus::Pending),
            "accepted" => Some(RsvpStatus::Accepted),
            "declined" => Some(RsvpStatus::Declined),
            _ => None,
        }
    }
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    /// Federated identity link. Stored verbatim from the auth provider.
    #[serde(default)]
    pub firebase_uid: Option<String>,
}

/// Directional friend-request row. Two users are "friends" only once a row
/// between them reaches `Accepted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRow {
    pub friend_row_id: i64,
    pub user_id: i64,
    pub friend_id: i64,
    pub status: FriendStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rsvp {
    pub rsvp_id: i64,
    pub event_id: i64,
    pub event_owner_id: i64,
    pub invite_recipient_id: i64,
    pub status: RsvpStatus,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Events and free-time/availability blocks share one table, disambiguated
/// by `is_event`. Free-time rows never receive RSVPs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub event_title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub is_event: bool,
    #[serde(default)]
    pub recurring: bool,
}

/// At most one row per user; `Option` fields model "not set yet" so the
/// merge engine can give keeper values precedence field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPrefs {
    pub preference_id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub theme: Option<i64>,
    #[serde(default)]
    pub notification_enabled: Option<bool>,
    #[serde(default)]
    pub color_scheme: Option<String>,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub notification_id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub notif_msg: String,
    #[serde(default)]
    pub notif_type: Option<String>,
    #[serde(default)]
    pub created_at: String,
}

// ============================================================================
// Inputs and patches
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub firebase_uid: Option<String>,
}

/// Partial user update — `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub firebase_uid: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    pub user_id: i64,
    /// Defaults to "Untitled Event" when absent.
    pub event_title: Option<String>,
    pub description: String,
    pub start_time: String,
    pub end_time: String,
    pub date: String,
    /// Defaults to `true`; `add_free_time` forces `false`.
    pub is_event: Option<bool>,
    /// Defaults to `false`.
    pub recurring: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    pub event_title: Option<String>,
    pub description: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub date: Option<String>,
    pub recurring: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NewRsvp {
    pub event_id: i64,
    pub event_owner_id: i64,
    pub invite_recipient_id: i64,
    pub status: RsvpStatus,
}

#[derive(Debug, Clone, Default)]
pub struct PrefsPatch {
    pub theme: Option<i64>,
    pub notification_enabled: Option<bool>,
    pub color_scheme: Option<String>,
}

impl PrefsPatch {
    pub fn is_empty(&self) -> bool {
        self.theme.is_none() && self.notification_enabled.is_none() && self.color_scheme.is_none()
    }
}

/// Locally persisted identity hints used to bridge a federated identity to a
/// local integer id (see `Db::resolve_local_user_id`).
#[derive(Debug, Clone, Default)]
pub struct AuthHints {
    pub firebase_uid: Option<String>,
    pub user_id: Option<i64>,
}

// ============================================================================
// Status reporting
// ============================================================================

/// Reported by `Db::status()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DbStatus {
    pub initialized: bool,
    /// Active backend name: `"sqlite"` or `"snapshot"`.
    pub backend: &'static str,
}

// ============================================================================
// Tests
// ============================================================================
