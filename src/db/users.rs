//! User entity operations.

use serde_json::{json, Value};

use crate::error::Result;
use crate::mirror::{EntityKind, MirrorJob};
use crate::types::{AuthHints, NewUser, User, UserPatch};

use super::Db;

fn patch_fields(patch: &UserPatch) -> Value {
    let mut m = serde_json::Map::new();
    if let Some(username) = &patch.username {
        m.insert("username".to_string(), json!(username));
    }
    if let Some(email) = &patch.email {
        m.insert("email".to_string(), json!(email));
    }
    if let Some(uid) = &patch.firebase_uid {
        m.insert("firebaseUid".to_string(), json!(uid));
    }
    Value::Object(m)
}

impl Db {
    /// Insert a user; the optional federated uid is stored verbatim.
    pub async fn create_user(&self, new: NewUser) -> Result<User> {
        let id = self.backend().insert_user(&new).await?;
        let user = User {
            user_id: id,
            username: new.username,
            email: new.email,
            firebase_uid: new.firebase_uid,
        };
        self.outbox().enqueue(MirrorJob::Upsert {
            entity: EntityKind::User,
            id,
            fields: serde_json::to_value(&user)?,
        });
        Ok(user)
    }

    pub async fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        Ok(self.backend().user_by_id(id).await?)
    }

    pub async fn get_user_by_firebase_uid(&self, uid: &str) -> Result<Option<User>> {
        Ok(self.backend().user_by_firebase_uid(uid).await?)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.backend().user_by_email(email).await?)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self.backend().user_by_username(username).await?)
    }

    pub async fn get_all_users(&self) -> Result<Vec<User>> {
        Ok(self.backend().all_users().await?)
    }

    /// Partial update; returns the row as stored afterwards, `None` if the
    /// user does not exist (the update is then a no-op).
    pub async fn update_user(&self, id: i64, patch: UserPatch) -> Result<Option<User>> {
        self.backend().update_user(id, &patch).await?;
        let updated = self.backend().user_by_id(id).await?;
        if updated.is_some() {
            self.outbox().enqueue(MirrorJob::Update {
                entity: EntityKind::User,
                id,
                fields: patch_fields(&patch),
            });
        }
        Ok(updated)
    }

    pub async fn delete_user(&self, id: i64) -> Result<()> {
        self.backend().delete_user(id).await?;
        self.outbox().enqueue(MirrorJob::Delete {
            entity: EntityKind::User,
            id,
        });
        Ok(())
    }

    /// Bridge a federated identity to the local integer id: the uid lookup
    /// wins, then a persisted numeric id (verified to still exist), else
    /// `None`.
    pub async fn resolve_local_user_id(&self, hints: &AuthHints) -> Result<Option<i64>> {
        if let Some(uid) = &hints.firebase_uid {
            if let Some(user) = self.backend().user_by_firebase_uid(uid).await? {
                return Ok(Some(user.user_id));
            }
        }
        if let Some(id) = hints.user_id {
            if self.backend().user_by_id(id).await?.is_some() {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }
}
