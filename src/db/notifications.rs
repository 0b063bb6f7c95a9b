//! Notification operations. `clear_notifications_for_user` is the bulk
//! primitive pull sync uses to replace a user's notifications wholesale.

use crate::error::Result;
use crate::mirror::{EntityKind, MirrorJob};
use crate::types::{now_rfc3339, Notification};

use super::Db;

impl Db {
    pub async fn create_notification(
        &self,
        user_id: i64,
        notif_msg: String,
        notif_type: Option<String>,
    ) -> Result<Notification> {
        let n = Notification {
            notification_id: 0,
            user_id,
            notif_msg,
            notif_type,
            created_at: now_rfc3339(),
        };
        let id = self.backend().insert_notification(&n).await?;
        let n = Notification {
            notification_id: id,
            ..n
        };
        self.outbox().enqueue(MirrorJob::Upsert {
            entity: EntityKind::Notification,
            id,
            fields: serde_json::to_value(&n)?,
        });
        Ok(n)
    }

    pub async fn get_notifications_for_user(&self, user_id: i64) -> Result<Vec<Notification>> {
        Ok(self.backend().notifications_for_user(user_id).await?)
    }

    pub async fn delete_notification(&self, id: i64) -> Result<()> {
        self.backend().delete_notification(id).await?;
        self.outbox().enqueue(MirrorJob::Delete {
            entity: EntityKind::Notification,
            id,
        });
        Ok(())
    }

    /// Bulk delete; returns how many rows were removed locally.
    pub async fn clear_notifications_for_user(&self, user_id: i64) -> Result<usize> {
        let removed = self.backend().clear_notifications_for_user(user_id).await?;
        self.outbox()
            .enqueue(MirrorJob::ClearNotifications { user_id });
        Ok(removed)
    }
}
