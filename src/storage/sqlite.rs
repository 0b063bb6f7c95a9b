//! SqliteBackend — the native backend, a bundled SQLite database behind a
//! mutex-guarded connection.
//!
//! Schema creation is idempotent (`CREATE TABLE IF NOT EXISTS` on open), so
//! an existing database file is picked up as-is. All statements run while
//! holding the connection lock; none of the per-call work suspends.

use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, Row};

use crate::error::StorageError;
use crate::types::{
    Event, EventPatch, FriendRow, FriendStatus, NewUser, Notification, PrefsPatch, Rsvp,
    RsvpStatus, User, UserPatch, UserPrefs,
};

use super::traits::StoreBackend;

pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

// ============================================================================
// Open / schema
// ============================================================================

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    user_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    username     TEXT NOT NULL,
    email        TEXT NOT NULL,
    firebase_uid TEXT
);
CREATE TABLE IF NOT EXISTS friends (
    friend_row_id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id       INTEGER NOT NULL,
    friend_id     INTEGER NOT NULL,
    status        TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS events (
    event_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     INTEGER NOT NULL,
    event_title TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    start_time  TEXT NOT NULL DEFAULT '',
    end_time    TEXT NOT NULL DEFAULT '',
    date        TEXT NOT NULL DEFAULT '',
    is_event    INTEGER NOT NULL DEFAULT 1,
    recurring   INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS rsvps (
    rsvp_id             INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id            INTEGER NOT NULL,
    event_owner_id      INTEGER NOT NULL,
    invite_recipient_id INTEGER NOT NULL,
    status              TEXT NOT NULL,
    created_at          TEXT NOT NULL DEFAULT '',
    updated_at          TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS user_prefs (
    preference_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id              INTEGER NOT NULL,
    theme                INTEGER,
    notification_enabled INTEGER,
    color_scheme         TEXT,
    updated_at           TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS notifications (
    notification_id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id         INTEGER NOT NULL,
    notif_msg       TEXT NOT NULL DEFAULT '',
    notif_type      TEXT,
    created_at      TEXT NOT NULL DEFAULT ''
);
";

impl SqliteBackend {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

// ============================================================================
// Row mappers
// ============================================================================

fn bad_text(what: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        format!("unknown {what}: {value:?}").into(),
    )
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        user_id: row.get("user_id")?,
        username: row.get("username")?,
        email: row.get("email")?,
        firebase_uid: row.get("firebase_uid")?,
    })
}

fn friend_from_row(row: &Row<'_>) -> rusqlite::Result<FriendRow> {
    let status: String = row.get("status")?;
    Ok(FriendRow {
        friend_row_id: row.get("friend_row_id")?,
        user_id: row.get("user_id")?,
        friend_id: row.get("friend_id")?,
        status: FriendStatus::parse(&status).ok_or_else(|| bad_text("friend status", &status))?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        event_id: row.get("event_id")?,
        user_id: row.get("user_id")?,
        event_title: row.get("event_title")?,
        description: row.get("description")?,
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        date: row.get("date")?,
        is_event: row.get("is_event")?,
        recurring: row.get("recurring")?,
    })
}

fn rsvp_from_row(row: &Row<'_>) -> rusqlite::Result<Rsvp> {
    let status: String = row.get("status")?;
    Ok(Rsvp {
        rsvp_id: row.get("rsvp_id")?,
        event_id: row.get("event_id")?,
        event_owner_id: row.get("event_owner_id")?,
        invite_recipient_id: row.get("invite_recipient_id")?,
        status: RsvpStatus::parse(&status).ok_or_else(|| bad_text("rsvp status", &status))?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn prefs_from_row(row: &Row<'_>) -> rusqlite::Result<UserPrefs> {
    Ok(UserPrefs {
        preference_id: row.get("preference_id")?,
        user_id: row.get("user_id")?,
        theme: row.get("theme")?,
        notification_enabled: row.get("notification_enabled")?,
        color_scheme: row.get("color_scheme")?,
        updated_at: row.get("updated_at")?,
    })
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        notification_id: row.get("notification_id")?,
        user_id: row.get("user_id")?,
        notif_msg: row.get("notif_msg")?,
        notif_type: row.get("notif_type")?,
        created_at: row.get("created_at")?,
    })
}

// ============================================================================
// Query helpers
// ============================================================================

impl SqliteBackend {
    fn query_one<T>(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Option<T>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query_map(params, map)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    fn query_all<T>(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, map)?;
        Ok(rows.collect::<rusqlite::Result<Vec<T>>>()?)
    }
}

#[async_trait]
impl StoreBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    // -----------------------------------------------------------------------
    // users
    // -----------------------------------------------------------------------

    async fn insert_user(&self, user: &NewUser) -> Result<i64, StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (username, email, firebase_uid) VALUES (?1, ?2, ?3)",
            params![user.username, user.email, user.firebase_uid],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn user_by_id(&self, id: i64) -> Result<Option<User>, StorageError> {
        self.query_one(
            "SELECT * FROM users WHERE user_id = ?1",
            params![id],
            user_from_row,
        )
    }

    async fn user_by_firebase_uid(&self, uid: &str) -> Result<Option<User>, StorageError> {
        self.query_one(
            "SELECT * FROM users WHERE firebase_uid = ?1",
            params![uid],
            user_from_row,
        )
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        self.query_one(
            "SELECT * FROM users WHERE email = ?1",
            params![email],
            user_from_row,
        )
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        self.query_one(
            "SELECT * FROM users WHERE username = ?1",
            params![username],
            user_from_row,
        )
    }

    async fn all_users(&self) -> Result<Vec<User>, StorageError> {
        self.query_all("SELECT * FROM users ORDER BY user_id", [], user_from_row)
    }

    async fn update_user(&self, id: i64, patch: &UserPatch) -> Result<(), StorageError> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(username) = &patch.username {
            sets.push("username = ?");
            values.push(Box::new(username.clone()));
        }
        if let Some(email) = &patch.email {
            sets.push("email = ?");
            values.push(Box::new(email.clone()));
        }
        if let Some(uid) = &patch.firebase_uid {
            sets.push("firebase_uid = ?");
            values.push(Box::new(uid.clone()));
        }
        if sets.is_empty() {
            return Ok(());
        }
        values.push(Box::new(id));
        let sql = format!("UPDATE users SET {} WHERE user_id = ?", sets.join(", "));
        let conn = self.conn.lock();
        conn.execute(&sql, params_from_iter(values.iter().map(|v| v.as_ref())))?;
        Ok(())
    }

    async fn delete_user(&self, id: i64) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM users WHERE user_id = ?1", params![id])?;
        Ok(())
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
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO friends (user_id, friend_id, status) VALUES (?1, ?2, ?3)",
            params![user_id, friend_id, status.as_str()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn friend_row(&self, row_id: i64) -> Result<Option<FriendRow>, StorageError> {
        self.query_one(
            "SELECT * FROM friends WHERE friend_row_id = ?1",
            params![row_id],
            friend_from_row,
        )
    }

    async fn friend_rows_for_user(&self, user_id: i64) -> Result<Vec<FriendRow>, StorageError> {
        self.query_all(
            "SELECT * FROM friends WHERE user_id = ?1 OR friend_id = ?1 ORDER BY friend_row_id",
            params![user_id],
            friend_from_row,
        )
    }

    async fn set_friend_status(
        &self,
        row_id: i64,
        status: FriendStatus,
    ) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE friends SET status = ?1 WHERE friend_row_id = ?2",
            params![status.as_str(), row_id],
        )?;
        Ok(())
    }

    async fn delete_friend_row(&self, row_id: i64) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM friends WHERE friend_row_id = ?1",
            params![row_id],
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // events
    // -----------------------------------------------------------------------

    async fn insert_event(&self, event: &Event) -> Result<i64, StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO events (user_id, event_title, description, start_time, end_time, date, is_event, recurring)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.user_id,
                event.event_title,
                event.description,
                event.start_time,
                event.end_time,
                event.date,
                event.is_event,
                event.recurring,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn event_by_id(&self, id: i64) -> Result<Option<Event>, StorageError> {
        self.query_one(
            "SELECT * FROM events WHERE event_id = ?1",
            params![id],
            event_from_row,
        )
    }

    async fn events_for_user(&self, user_id: i64) -> Result<Vec<Event>, StorageError> {
        self.query_all(
            "SELECT * FROM events WHERE user_id = ?1 ORDER BY event_id",
            params![user_id],
            event_from_row,
        )
    }

    async fn update_event(&self, id: i64, patch: &EventPatch) -> Result<(), StorageError> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(title) = &patch.event_title {
            sets.push("event_title = ?");
            values.push(Box::new(title.clone()));
        }
        if let Some(description) = &patch.description {
            sets.push("description = ?");
            values.push(Box::new(description.clone()));
        }
        if let Some(start) = &patch.start_time {
            sets.push("start_time = ?");
            values.push(Box::new(start.clone()));
        }
        if let Some(end) = &patch.end_time {
            sets.push("end_time = ?");
            values.push(Box::new(end.clone()));
        }
        if let Some(date) = &patch.date {
            sets.push("date = ?");
            values.push(Box::new(date.clone()));
        }
        if let Some(recurring) = patch.recurring {
            sets.push("recurring = ?");
            values.push(Box::new(recurring));
        }
        if sets.is_empty() {
            return Ok(());
        }
        values.push(Box::new(id));
        let sql = format!("UPDATE events SET {} WHERE event_id = ?", sets.join(", "));
        let conn = self.conn.lock();
        conn.execute(&sql, params_from_iter(values.iter().map(|v| v.as_ref())))?;
        Ok(())
    }

    async fn delete_event(&self, id: i64) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM events WHERE event_id = ?1", params![id])?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // rsvps
    // -----------------------------------------------------------------------

    async fn insert_rsvp(&self, rsvp: &Rsvp) -> Result<i64, StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO rsvps (event_id, event_owner_id, invite_recipient_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                rsvp.event_id,
                rsvp.event_owner_id,
                rsvp.invite_recipient_id,
                rsvp.status.as_str(),
                rsvp.created_at,
                rsvp.updated_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn rsvp_by_id(&self, id: i64) -> Result<Option<Rsvp>, StorageError> {
        self.query_one(
            "SELECT * FROM rsvps WHERE rsvp_id = ?1",
            params![id],
            rsvp_from_row,
        )
    }

    async fn rsvps_for_event(&self, event_id: i64) -> Result<Vec<Rsvp>, StorageError> {
        self.query_all(
            "SELECT * FROM rsvps WHERE event_id = ?1 ORDER BY rsvp_id",
            params![event_id],
            rsvp_from_row,
        )
    }

    async fn rsvps_for_user(&self, user_id: i64) -> Result<Vec<Rsvp>, StorageError> {
        self.query_all(
            "SELECT * FROM rsvps WHERE event_owner_id = ?1 OR invite_recipient_id = ?1 ORDER BY rsvp_id",
            params![user_id],
            rsvp_from_row,
        )
    }

    async fn set_rsvp_status(
        &self,
        id: i64,
        status: RsvpStatus,
        updated_at: &str,
    ) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE rsvps SET status = ?1, updated_at = ?2 WHERE rsvp_id = ?3",
            params![status.as_str(), updated_at, id],
        )?;
        Ok(())
    }

    async fn delete_rsvp(&self, id: i64) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM rsvps WHERE rsvp_id = ?1", params![id])?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // notifications
    // -----------------------------------------------------------------------

    async fn insert_notification(&self, n: &Notification) -> Result<i64, StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO notifications (user_id, notif_msg, notif_type, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![n.user_id, n.notif_msg, n.notif_type, n.created_at],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn notifications_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<Notification>, StorageError> {
        self.query_all(
            "SELECT * FROM notifications WHERE user_id = ?1 ORDER BY notification_id",
            params![user_id],
            notification_from_row,
        )
    }

    async fn delete_notification(&self, id: i64) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM notifications WHERE notification_id = ?1",
            params![id],
        )?;
        Ok(())
    }

    async fn clear_notifications_for_user(&self, user_id: i64) -> Result<usize, StorageError> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM notifications WHERE user_id = ?1",
            params![user_id],
        )?;
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // user_prefs
    // -----------------------------------------------------------------------

    async fn prefs_for_user(&self, user_id: i64) -> Result<Option<UserPrefs>, StorageError> {
        self.query_one(
            "SELECT * FROM user_prefs WHERE user_id = ?1",
            params![user_id],
            prefs_from_row,
        )
    }

    async fn insert_prefs(&self, prefs: &UserPrefs) -> Result<i64, StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO user_prefs (user_id, theme, notification_enabled, color_scheme, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                prefs.user_id,
                prefs.theme,
                prefs.notification_enabled,
                prefs.color_scheme,
                prefs.updated_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn update_prefs(
        &self,
        preference_id: i64,
        patch: &PrefsPatch,
        updated_at: &str,
    ) -> Result<(), StorageError> {
        let mut sets: Vec<&str> = vec!["updated_at = ?"];
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(updated_at.to_string())];
        if let Some(theme) = patch.theme {
            sets.push("theme = ?");
            values.push(Box::new(theme));
        }
        if let Some(enabled) = patch.notification_enabled {
            sets.push("notification_enabled = ?");
            values.push(Box::new(enabled));
        }
        if let Some(scheme) = &patch.color_scheme {
            sets.push("color_scheme = ?");
            values.push(Box::new(scheme.clone()));
        }
        values.push(Box::new(preference_id));
        let sql = format!(
            "UPDATE user_prefs SET {} WHERE preference_id = ?",
            sets.join(", ")
        );
        let conn = self.conn.lock();
        conn.execute(&sql, params_from_iter(values.iter().map(|v| v.as_ref())))?;
        Ok(())
    }

    async fn delete_prefs_for_user(&self, user_id: i64) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM user_prefs WHERE user_id = ?1", params![user_id])?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> SqliteBackend {
        SqliteBackend::open_in_memory().unwrap()
    }

    #[tokio::test]
    async fn schema_creation_is_idempotent() {
        let b = backend();
        // Re-running the batch against the same connection must not error.
        b.conn.lock().execute_batch(SCHEMA).unwrap();
    }

    #[tokio::test]
    async fn insert_returns_autoincrement_ids() {
        let b = backend();
        let first = b
            .insert_user(&NewUser {
                username: "ada".into(),
                email: "ada@x.com".into(),
                firebase_uid: None,
            })
            .await
            .unwrap();
        let second = b
            .insert_user(&NewUser {
                username: "bob".into(),
                email: "bob@x.com".into(),
                firebase_uid: Some("uid-b".into()),
            })
            .await
            .unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);

        let bob = b.user_by_firebase_uid("uid-b").await.unwrap().unwrap();
        assert_eq!(bob.username, "bob");
    }

    #[tokio::test]
    async fn empty_patch_is_a_no_op() {
        let b = backend();
        let id = b
            .insert_user(&NewUser {
                username: "ada".into(),
                email: "ada@x.com".into(),
                firebase_uid: None,
            })
            .await
            .unwrap();
        b.update_user(id, &UserPatch::default()).await.unwrap();
        let u = b.user_by_id(id).await.unwrap().unwrap();
        assert_eq!(u.username, "ada");
    }

    #[tokio::test]
    async fn update_of_missing_row_is_a_no_op() {
        let b = backend();
        b.update_event(
            999,
            &EventPatch {
                event_title: Some("ghost".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(b.event_by_id(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_notifications_reports_removed_count() {
        let b = backend();
        for msg in ["a", "b"] {
            b.insert_notification(&Notification {
                notification_id: 0,
                user_id: 1,
                notif_msg: msg.into(),
                notif_type: None,
                created_at: String::new(),
            })
            .await
            .unwrap();
        }
        assert_eq!(b.clear_notifications_for_user(1).await.unwrap(), 2);
        assert_eq!(b.clear_notifications_for_user(1).await.unwrap(), 0);
    }
}
