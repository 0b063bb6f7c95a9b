//! RSVP operations.

use crate::error::Result;
use crate::mirror::{EntityKind, MirrorJob};
use crate::types::{now_rfc3339, NewRsvp, Rsvp, RsvpStatus};

use super::Db;

impl Db {
    pub async fn create_rsvp(&self, new: NewRsvp) -> Result<Rsvp> {
        let now = now_rfc3339();
        let rsvp = Rsvp {
            rsvp_id: 0,
            event_id: new.event_id,
            event_owner_id: new.event_owner_id,
            invite_recipient_id: new.invite_recipient_id,
            status: new.status,
            created_at: now.clone(),
            updated_at: now,
        };
        let id = self.backend().insert_rsvp(&rsvp).await?;
        let rsvp = Rsvp { rsvp_id: id, ..rsvp };
        self.outbox().enqueue(MirrorJob::Upsert {
            entity: EntityKind::Rsvp,
            id,
            fields: serde_json::to_value(&rsvp)?,
        });
        Ok(rsvp)
    }

    pub async fn get_rsvp_by_id(&self, id: i64) -> Result<Option<Rsvp>> {
        Ok(self.backend().rsvp_by_id(id).await?)
    }

    pub async fn get_rsvps_for_event(&self, event_id: i64) -> Result<Vec<Rsvp>> {
        Ok(self.backend().rsvps_for_event(event_id).await?)
    }

    /// RSVPs where the user is the event owner or the invite recipient.
    pub async fn get_rsvps_for_user(&self, user_id: i64) -> Result<Vec<Rsvp>> {
        Ok(self.backend().rsvps_for_user(user_id).await?)
    }

    /// Set the status and refresh `updated_at`. Missing row is a no-op
    /// returning `None`.
    pub async fn update_rsvp(&self, id: i64, status: RsvpStatus) -> Result<Option<Rsvp>> {
        if self.backend().rsvp_by_id(id).await?.is_none() {
            return Ok(None);
        }
        let now = now_rfc3339();
        self.backend().set_rsvp_status(id, status, &now).await?;
        self.outbox().enqueue(MirrorJob::Update {
            entity: EntityKind::Rsvp,
            id,
            fields: serde_json::json!({ "status": status, "updatedAt": now }),
        });
        Ok(self.backend().rsvp_by_id(id).await?)
    }

    pub async fn delete_rsvp(&self, id: i64) -> Result<()> {
        self.backend().delete_rsvp(id).await?;
        self.outbox().enqueue(MirrorJob::Delete {
            entity: EntityKind::Rsvp,
            id,
        });
        Ok(())
    }
}
