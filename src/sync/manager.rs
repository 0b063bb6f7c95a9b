//! Pull sync: fetch the backend's view of one user and fold it into the
//! local store.
//!
//! Remote and local id spaces are unrelated, so rows are matched by natural
//! keys: users by federated uid then email, events by owner+title+date+start,
//! friend rows by their directional pair, RSVPs by event+invitee.
//! Notifications are replaced wholesale; preferences upsert. Each resource
//! fetch is independently fault-tolerant — a failed fetch is logged and the
//! other resources still apply.

use std::collections::HashMap;
use std::sync::Arc;

use crate::db::Db;
use crate::dedupe::{CleanupAction, CleanupOptions};
use crate::error::{Result, SyncError};
use crate::mirror::{EntityKind, MirrorJob};
use crate::types::{
    now_rfc3339, Event, FriendStatus, NewUser, Notification, PrefsPatch, Rsvp, RsvpStatus,
    UserPatch,
};

use super::api::{
    ApiEvent, ApiFriend, ApiNotification, ApiPreferences, ApiRsvp, ApiUser, BackendApi,
};

// ============================================================================
// PullReport
// ============================================================================

#[derive(Debug, Default)]
pub struct PullReport {
    pub users_created: usize,
    /// Local rows that gained a federated uid during matching.
    pub users_linked: usize,
    pub events_added: usize,
    pub friends_added: usize,
    pub friends_updated: usize,
    pub rsvps_added: usize,
    pub rsvps_updated: usize,
    pub notifications_replaced: usize,
    pub prefs_applied: bool,
    pub duplicates_merged: usize,
    /// Resources whose fetch failed and were skipped this cycle.
    pub failed_resources: Vec<&'static str>,
}

// ============================================================================
// SyncManager
// ============================================================================

pub struct SyncManager {
    db: Db,
    api: Arc<dyn BackendApi>,
}

fn note_failure<T>(
    result: Result<T, SyncError>,
    resource: &'static str,
    report: &mut PullReport,
) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            log::warn!("{resource} fetch failed; continuing without it: {e}");
            report.failed_resources.push(resource);
            None
        }
    }
}

impl SyncManager {
    pub fn new(db: Db, api: Arc<dyn BackendApi>) -> Self {
        Self { db, api }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// One pull cycle for `remote_user_id` (the backend's id for the signed-in
    /// user). Mirror consumption is paused while rows are applied and the
    /// prior state restored afterwards.
    pub async fn sync_from_backend(&self, remote_user_id: i64) -> Result<PullReport> {
        let (users, events, friends, rsvps, notifications, preferences) = tokio::join!(
            self.api.fetch_users(),
            self.api.fetch_events(remote_user_id),
            self.api.fetch_friends(remote_user_id),
            self.api.fetch_rsvps(remote_user_id),
            self.api.fetch_notifications(remote_user_id),
            self.api.fetch_preferences(remote_user_id),
        );

        let mut report = PullReport::default();
        let users = note_failure(users, "users", &mut report).unwrap_or_default();
        let events = note_failure(events, "events", &mut report).unwrap_or_default();
        let friends = note_failure(friends, "friends", &mut report).unwrap_or_default();
        let rsvps = note_failure(rsvps, "rsvps", &mut report).unwrap_or_default();
        // Held as Option: a failed fetch must not wipe local notifications.
        let notifications = note_failure(notifications, "notifications", &mut report);
        let preferences = note_failure(preferences, "preferences", &mut report).flatten();

        let was_paused = self.db.outbox().is_paused();
        self.db.pause_mirroring();

        let result: Result<()> = async {
            let user_map = self.apply_users(users, &mut report).await?;
            let target = user_map.get(&remote_user_id).copied();
            let event_map = self.apply_events(events, &user_map, &mut report).await?;
            self.apply_friends(friends, &user_map, &mut report).await?;
            self.apply_rsvps(rsvps, &user_map, &event_map, &mut report)
                .await?;
            if let (Some(notifications), Some(target)) = (notifications, target) {
                self.apply_notifications(notifications, target, &mut report)
                    .await?;
            }
            if let (Some(prefs), Some(target)) = (preferences, target) {
                self.apply_preferences(prefs, target, &mut report).await?;
            }
            Ok(())
        }
        .await;

        if result.is_ok() {
            // Pulled accounts can collide with locally created ones.
            match self
                .db
                .run_duplicate_cleanup(CleanupOptions {
                    dry_run: false,
                    auto_merge: true,
                })
                .await
            {
                Ok(cleanup) => {
                    report.duplicates_merged = cleanup
                        .outcomes
                        .iter()
                        .filter(|o| o.action == CleanupAction::Merged)
                        .count();
                }
                Err(e) => log::warn!("post-sync duplicate cleanup failed: {e}"),
            }
        }

        self.db.outbox().set_paused(was_paused);
        result?;

        log::info!(
            "pull sync for remote user {remote_user_id}: +{} users, +{} events, +{} friends, \
             +{} rsvps, {} notifications, {} merge(s), {} failed fetch(es)",
            report.users_created,
            report.events_added,
            report.friends_added,
            report.rsvps_added,
            report.notifications_replaced,
            report.duplicates_merged,
            report.failed_resources.len()
        );
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Apply steps
    // -----------------------------------------------------------------------

    /// Returns the remote→local user id map.
    async fn apply_users(
        &self,
        users: Vec<ApiUser>,
        report: &mut PullReport,
    ) -> Result<HashMap<i64, i64>> {
        let mut map = HashMap::new();
        for remote in users {
            let by_uid = match remote.firebase_uid.as_deref().filter(|u| !u.is_empty()) {
                Some(uid) => self.db.get_user_by_firebase_uid(uid).await?,
                None => None,
            };
            let local = match by_uid {
                Some(user) => Some(user),
                None if !remote.email.is_empty() => {
                    self.db.get_user_by_email(&remote.email).await?
                }
                None => None,
            };
            match local {
                Some(user) => {
                    let missing_uid = user.firebase_uid.as_deref().unwrap_or("").is_empty();
                    if missing_uid {
                        if let Some(uid) =
                            remote.firebase_uid.clone().filter(|u| !u.is_empty())
                        {
                            self.db
                                .update_user(
                                    user.user_id,
                                    UserPatch {
                                        firebase_uid: Some(uid),
                                        ..Default::default()
                                    },
                                )
                                .await?;
                            report.users_linked += 1;
                        }
                    }
                    map.insert(remote.user_id, user.user_id);
                }
                None => {
                    let created = self
                        .db
                        .create_user(NewUser {
                            username: remote.username,
                            email: remote.email,
                            firebase_uid: remote.firebase_uid,
                        })
                        .await?;
                    report.users_created += 1;
                    map.insert(remote.user_id, created.user_id);
                }
            }
        }
        Ok(map)
    }

    /// Returns the remote→local event id map.
    async fn apply_events(
        &self,
        events: Vec<ApiEvent>,
        user_map: &HashMap<i64, i64>,
        report: &mut PullReport,
    ) -> Result<HashMap<i64, i64>> {
        let mut event_map = HashMap::new();
        let mut local_by_owner: HashMap<i64, Vec<Event>> = HashMap::new();

        for remote in events {
            let Some(&owner) = user_map.get(&remote.user_id) else {
                log::warn!("event {} references unknown user {}", remote.event_id, remote.user_id);
                continue;
            };
            if !local_by_owner.contains_key(&owner) {
                let rows = self.db.backend().events_for_user(owner).await?;
                local_by_owner.insert(owner, rows);
            }
            let existing = local_by_owner
                .get(&owner)
                .and_then(|rows| {
                    rows.iter().find(|e| {
                        e.event_title == remote.event_title
                            && e.date == remote.date
                            && e.start_time == remote.start_time
                    })
                })
                .map(|e| e.event_id);

            match existing {
                Some(local_id) => {
                    event_map.insert(remote.event_id, local_id);
                }
                None => {
                    let event = Event {
                        event_id: 0,
                        user_id: owner,
                        event_title: remote.event_title,
                        description: remote.description,
                        start_time: remote.start_time,
                        end_time: remote.end_time,
                        date: remote.date,
                        is_event: remote.is_event,
                        recurring: remote.recurring,
                    };
                    let id = self.db.backend().insert_event(&event).await?;
                    let event = Event { event_id: id, ..event };
                    self.db.outbox().enqueue(MirrorJob::Upsert {
                        entity: EntityKind::Event,
                        id,
                        fields: serde_json::to_value(&event)?,
                    });
                    event_map.insert(remote.event_id, id);
                    if let Some(rows) = local_by_owner.get_mut(&owner) {
                        rows.push(event);
                    }
                    report.events_added += 1;
                }
            }
        }
        Ok(event_map)
    }

    async fn apply_friends(
        &self,
        friends: Vec<ApiFriend>,
        user_map: &HashMap<i64, i64>,
        report: &mut PullReport,
    ) -> Result<()> {
        for remote in friends {
            let Some(&from) = user_map.get(&remote.user_id) else {
                continue;
            };
            let Some(&to) = user_map.get(&remote.friend_id) else {
                continue;
            };
            let Some(status) = FriendStatus::parse(&remote.status) else {
                log::warn!("skipping friend row with unknown status {:?}", remote.status);
                continue;
            };

            let rows = self.db.backend().friend_rows_for_user(from).await?;
            match rows.iter().find(|r| r.user_id == from && r.friend_id == to) {
                Some(row) if row.status != status => {
                    self.db
                        .backend()
                        .set_friend_status(row.friend_row_id, status)
                        .await?;
                    self.db.outbox().enqueue(MirrorJob::Update {
                        entity: EntityKind::Friend,
                        id: row.friend_row_id,
                        fields: serde_json::json!({ "status": status }),
                    });
                    report.friends_updated += 1;
                }
                Some(_) => {}
                None => {
                    let id = self.db.backend().insert_friend_row(from, to, status).await?;
                    self.db.outbox().enqueue(MirrorJob::Upsert {
                        entity: EntityKind::Friend,
                        id,
                        fields: serde_json::json!({
                            "friendRowId": id,
                            "userId": from,
                            "friendId": to,
                            "status": status,
                        }),
                    });
                    report.friends_added += 1;
                }
            }
        }
        Ok(())
    }

    async fn apply_rsvps(
        &self,
        rsvps: Vec<ApiRsvp>,
        user_map: &HashMap<i64, i64>,
        event_map: &HashMap<i64, i64>,
        report: &mut PullReport,
    ) -> Result<()> {
        for remote in rsvps {
            let Some(&event_id) = event_map.get(&remote.event_id) else {
                continue;
            };
            let Some(&owner) = user_map.get(&remote.event_owner_id) else {
                continue;
            };
            let Some(&recipient) = user_map.get(&remote.invite_recipient_id) else {
                continue;
            };
            let Some(status) = RsvpStatus::parse(&remote.status) else {
                log::warn!("skipping rsvp with unknown status {:?}", remote.status);
                continue;
            };

            let existing = self.db.backend().rsvps_for_event(event_id).await?;
            match existing.iter().find(|r| r.invite_recipient_id == recipient) {
                Some(row) if row.status != status => {
                    let updated_at = if remote.updated_at.is_empty() {
                        now_rfc3339()
                    } else {
                        remote.updated_at.clone()
                    };
                    self.db
                        .backend()
                        .set_rsvp_status(row.rsvp_id, status, &updated_at)
                        .await?;
                    self.db.outbox().enqueue(MirrorJob::Update {
                        entity: EntityKind::Rsvp,
                        id: row.rsvp_id,
                        fields: serde_json::json!({ "status": status, "updatedAt": updated_at }),
                    });
                    report.rsvps_updated += 1;
                }
                Some(_) => {}
                None => {
                    let rsvp = Rsvp {
                        rsvp_id: 0,
                        event_id,
                        event_owner_id: owner,
                        invite_recipient_id: recipient,
                        status,
                        created_at: remote.created_at.clone(),
                        updated_at: remote.updated_at.clone(),
                    };
                    let id = self.db.backend().insert_rsvp(&rsvp).await?;
                    let rsvp = Rsvp { rsvp_id: id, ..rsvp };
                    self.db.outbox().enqueue(MirrorJob::Upsert {
                        entity: EntityKind::Rsvp,
                        id,
                        fields: serde_json::to_value(&rsvp)?,
                    });
                    report.rsvps_added += 1;
                }
            }
        }
        Ok(())
    }

    /// Wholesale replacement, preserving the remote timestamps.
    async fn apply_notifications(
        &self,
        notifications: Vec<ApiNotification>,
        target: i64,
        report: &mut PullReport,
    ) -> Result<()> {
        self.db
            .backend()
            .clear_notifications_for_user(target)
            .await?;
        self.db
            .outbox()
            .enqueue(MirrorJob::ClearNotifications { user_id: target });

        for remote in notifications {
            let n = Notification {
                notification_id: 0,
                user_id: target,
                notif_msg: remote.notif_msg,
                notif_type: remote.notif_type,
                created_at: remote.created_at,
            };
            let id = self.db.backend().insert_notification(&n).await?;
            let n = Notification {
                notification_id: id,
                ..n
            };
            self.db.outbox().enqueue(MirrorJob::Upsert {
                entity: EntityKind::Notification,
                id,
                fields: serde_json::to_value(&n)?,
            });
            report.notifications_replaced += 1;
        }
        Ok(())
    }

    async fn apply_preferences(
        &self,
        prefs: ApiPreferences,
        target: i64,
        report: &mut PullReport,
    ) -> Result<()> {
        self.db
            .set_user_preferences(
                target,
                PrefsPatch {
                    theme: prefs.theme,
                    notification_enabled: prefs.notification_enabled,
                    color_scheme: prefs.color_scheme,
                },
            )
            .await?;
        report.prefs_applied = true;
        Ok(())
    }
}
