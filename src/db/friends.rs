//! Friend-request operations.
//!
//! Rows are directional: `user_id` sent the request, `friend_id` received
//! it. Two users are friends once any row between them is accepted.

use crate::error::Result;
use crate::mirror::{EntityKind, MirrorJob};
use crate::types::{FriendRow, FriendStatus, User};

use super::Db;

impl Db {
    /// Insert a pending request row. Known gap kept from the original
    /// behavior: there is no existing-row check, so repeated requests (or a
    /// request crossing one in the other direction) insert additional rows.
    pub async fn send_friend_request(&self, user_id: i64, friend_id: i64) -> Result<FriendRow> {
        let id = self
            .backend()
            .insert_friend_row(user_id, friend_id, FriendStatus::Pending)
            .await?;
        let row = FriendRow {
            friend_row_id: id,
            user_id,
            friend_id,
            status: FriendStatus::Pending,
        };
        self.outbox().enqueue(MirrorJob::Upsert {
            entity: EntityKind::Friend,
            id,
            fields: serde_json::to_value(&row)?,
        });
        Ok(row)
    }

    /// Accept or reject a request row. No addressee validation: any caller
    /// holding the row id can respond. Missing row is a no-op returning
    /// `None`.
    pub async fn respond_friend_request(
        &self,
        row_id: i64,
        accept: bool,
    ) -> Result<Option<FriendRow>> {
        let status = if accept {
            FriendStatus::Accepted
        } else {
            FriendStatus::Rejected
        };
        let Some(mut row) = self.backend().friend_row(row_id).await? else {
            return Ok(None);
        };
        self.backend().set_friend_status(row_id, status).await?;
        row.status = status;
        self.outbox().enqueue(MirrorJob::Update {
            entity: EntityKind::Friend,
            id: row_id,
            fields: serde_json::json!({ "status": status }),
        });
        Ok(Some(row))
    }

    /// Users friended with `user_id`: accepted rows, either direction.
    pub async fn get_friends_for_user(&self, user_id: i64) -> Result<Vec<User>> {
        let rows = self.backend().friend_rows_for_user(user_id).await?;
        let mut friends = Vec::new();
        for row in rows {
            if row.status != FriendStatus::Accepted {
                continue;
            }
            let other = if row.user_id == user_id {
                row.friend_id
            } else {
                row.user_id
            };
            if let Some(user) = self.backend().user_by_id(other).await? {
                friends.push(user);
            }
        }
        Ok(friends)
    }
}
