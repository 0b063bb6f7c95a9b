//! Event and free-time operations. Both share the events table; `is_event`
//! distinguishes them.

use serde_json::{json, Value};

use crate::error::Result;
use crate::mirror::{EntityKind, MirrorJob};
use crate::types::{Event, EventPatch, NewEvent};

use super::Db;

const DEFAULT_TITLE: &str = "Untitled Event";

fn patch_fields(patch: &EventPatch) -> Value {
    let mut m = serde_json::Map::new();
    if let Some(title) = &patch.event_title {
        m.insert("eventTitle".to_string(), json!(title));
    }
    if let Some(description) = &patch.description {
        m.insert("description".to_string(), json!(description));
    }
    if let Some(start) = &patch.start_time {
        m.insert("startTime".to_string(), json!(start));
    }
    if let Some(end) = &patch.end_time {
        m.insert("endTime".to_string(), json!(end));
    }
    if let Some(date) = &patch.date {
        m.insert("date".to_string(), json!(date));
    }
    if let Some(recurring) = patch.recurring {
        m.insert("recurring".to_string(), json!(recurring));
    }
    Value::Object(m)
}

impl Db {
    pub async fn create_event(&self, new: NewEvent) -> Result<Event> {
        let event = Event {
            event_id: 0,
            user_id: new.user_id,
            event_title: new
                .event_title
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            description: new.description,
            start_time: new.start_time,
            end_time: new.end_time,
            date: new.date,
            is_event: new.is_event.unwrap_or(true),
            recurring: new.recurring.unwrap_or(false),
        };
        let id = self.backend().insert_event(&event).await?;
        let event = Event { event_id: id, ..event };
        self.outbox().enqueue(MirrorJob::Upsert {
            entity: EntityKind::Event,
            id,
            fields: serde_json::to_value(&event)?,
        });
        Ok(event)
    }

    /// A free-time block is an event row with `is_event` forced false.
    pub async fn add_free_time(&self, new: NewEvent) -> Result<Event> {
        self.create_event(NewEvent {
            is_event: Some(false),
            ..new
        })
        .await
    }

    pub async fn get_event_by_id(&self, id: i64) -> Result<Option<Event>> {
        Ok(self.backend().event_by_id(id).await?)
    }

    /// Real events only, ascending by start time.
    pub async fn get_events_for_user(&self, user_id: i64) -> Result<Vec<Event>> {
        self.user_events(user_id, true).await
    }

    /// Free-time blocks only, ascending by start time.
    pub async fn get_free_time_for_user(&self, user_id: i64) -> Result<Vec<Event>> {
        self.user_events(user_id, false).await
    }

    async fn user_events(&self, user_id: i64, is_event: bool) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self
            .backend()
            .events_for_user(user_id)
            .await?
            .into_iter()
            .filter(|e| e.is_event == is_event)
            .collect();
        events.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(events)
    }

    pub async fn update_event(&self, id: i64, patch: EventPatch) -> Result<Option<Event>> {
        self.backend().update_event(id, &patch).await?;
        let updated = self.backend().event_by_id(id).await?;
        if updated.is_some() {
            self.outbox().enqueue(MirrorJob::Update {
                entity: EntityKind::Event,
                id,
                fields: patch_fields(&patch),
            });
        }
        Ok(updated)
    }

    pub async fn delete_event(&self, id: i64) -> Result<()> {
        self.backend().delete_event(id).await?;
        self.outbox().enqueue(MirrorJob::Delete {
            entity: EntityKind::Event,
            id,
        });
        Ok(())
    }
}
