//! Pull-sync tests against an in-crate fake of the REST backend.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use huddle_db::sync::api::{
    ApiEvent, ApiFriend, ApiNotification, ApiPreferences, ApiRsvp, ApiUser,
};
use huddle_db::{
    AutoSync, BackendApi, Db, MemoryDocumentStore, NewUser, SqliteBackend, SyncError,
    SyncManager,
};

// ============================================================================
// Fake backend
// ============================================================================

#[derive(Default)]
struct FakeApi {
    users: Vec<ApiUser>,
    events: Vec<ApiEvent>,
    friends: Vec<ApiFriend>,
    rsvps: Vec<ApiRsvp>,
    notifications: Vec<ApiNotification>,
    preferences: Option<ApiPreferences>,
    /// Resource names whose fetch fails.
    failing: HashSet<&'static str>,
    user_fetches: AtomicUsize,
}

impl FakeApi {
    fn check(&self, resource: &'static str) -> Result<(), SyncError> {
        if self.failing.contains(resource) {
            Err(SyncError::Transport(format!("{resource} down")))
        } else {
            Ok(())
        }
    }

    fn user_fetches(&self) -> usize {
        self.user_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendApi for FakeApi {
    async fn fetch_users(&self) -> Result<Vec<ApiUser>, SyncError> {
        self.user_fetches.fetch_add(1, Ordering::SeqCst);
        self.check("users")?;
        Ok(self.users.clone())
    }
    async fn fetch_events(&self, _: i64) -> Result<Vec<ApiEvent>, SyncError> {
        self.check("events")?;
        Ok(self.events.clone())
    }
    async fn fetch_friends(&self, _: i64) -> Result<Vec<ApiFriend>, SyncError> {
        self.check("friends")?;
        Ok(self.friends.clone())
    }
    async fn fetch_rsvps(&self, _: i64) -> Result<Vec<ApiRsvp>, SyncError> {
        self.check("rsvps")?;
        Ok(self.rsvps.clone())
    }
    async fn fetch_notifications(&self, _: i64) -> Result<Vec<ApiNotification>, SyncError> {
        self.check("notifications")?;
        Ok(self.notifications.clone())
    }
    async fn fetch_preferences(&self, _: i64) -> Result<Option<ApiPreferences>, SyncError> {
        self.check("preferences")?;
        Ok(self.preferences.clone())
    }
}

// ============================================================================
// Test helpers
// ============================================================================

fn db() -> Db {
    Db::with_backend(
        Arc::new(SqliteBackend::open_in_memory().expect("open in-memory DB")),
        Arc::new(MemoryDocumentStore::new()),
    )
}

fn manager(db: &Db, api: Arc<FakeApi>) -> SyncManager {
    SyncManager::new(db.clone(), api)
}

fn remote_user(id: i64, username: &str, email: &str, uid: Option<&str>) -> ApiUser {
    ApiUser {
        user_id: id,
        username: username.to_string(),
        email: email.to_string(),
        firebase_uid: uid.map(str::to_string),
    }
}

/// A backend view: user 77 (ada) hosts an event, user 78 (bob) accepted the
/// friendship and has a pending RSVP.
fn populated_api() -> FakeApi {
    FakeApi {
        users: vec![
            remote_user(77, "ada", "ada@x.com", Some("uid-ada")),
            remote_user(78, "bob", "bob@x.com", Some("uid-bob")),
        ],
        events: vec![ApiEvent {
            event_id: 500,
            user_id: 77,
            event_title: "picnic".to_string(),
            date: "2026-09-05".to_string(),
            start_time: "12:00".to_string(),
            end_time: "14:00".to_string(),
            ..Default::default()
        }],
        friends: vec![ApiFriend {
            user_id: 77,
            friend_id: 78,
            status: "accepted".to_string(),
        }],
        rsvps: vec![ApiRsvp {
            event_id: 500,
            event_owner_id: 77,
            invite_recipient_id: 78,
            status: "pending".to_string(),
            created_at: "2026-09-01T10:00:00Z".to_string(),
            updated_at: "2026-09-01T10:00:00Z".to_string(),
        }],
        notifications: vec![ApiNotification {
            user_id: 77,
            notif_msg: "bob accepted your request".to_string(),
            notif_type: Some("friend".to_string()),
            created_at: "2026-09-01T09:00:00Z".to_string(),
        }],
        preferences: Some(ApiPreferences {
            user_id: 77,
            theme: Some(2),
            notification_enabled: Some(true),
            color_scheme: None,
        }),
        ..Default::default()
    }
}

// ============================================================================
// sync_from_backend
// ============================================================================

#[tokio::test]
async fn full_pull_applies_every_resource() {
    let db = db();
    let sync = manager(&db, Arc::new(populated_api()));

    let report = sync.sync_from_backend(77).await.unwrap();
    assert_eq!(report.users_created, 2);
    assert_eq!(report.events_added, 1);
    assert_eq!(report.friends_added, 1);
    assert_eq!(report.rsvps_added, 1);
    assert_eq!(report.notifications_replaced, 1);
    assert!(report.prefs_applied);
    assert!(report.failed_resources.is_empty());

    let ada = db.get_user_by_firebase_uid("uid-ada").await.unwrap().unwrap();
    let events = db.get_events_for_user(ada.user_id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_title, "picnic");

    let friends = db.get_friends_for_user(ada.user_id).await.unwrap();
    assert_eq!(friends.len(), 1);
    assert_eq!(friends[0].username, "bob");

    let rsvps = db.get_rsvps_for_event(events[0].event_id).await.unwrap();
    assert_eq!(rsvps.len(), 1);

    let notifications = db.get_notifications_for_user(ada.user_id).await.unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].created_at, "2026-09-01T09:00:00Z");

    let prefs = db.get_user_preferences(ada.user_id).await.unwrap().unwrap();
    assert_eq!(prefs.theme, Some(2));
}

#[tokio::test]
async fn repeated_pull_adds_nothing() {
    let db = db();
    let sync = manager(&db, Arc::new(populated_api()));
    sync.sync_from_backend(77).await.unwrap();
    let second = sync.sync_from_backend(77).await.unwrap();

    assert_eq!(second.users_created, 0);
    assert_eq!(second.events_added, 0);
    assert_eq!(second.friends_added, 0);
    assert_eq!(second.rsvps_added, 0);
    assert_eq!(db.get_all_users().await.unwrap().len(), 2);
}

#[tokio::test]
async fn one_failed_resource_leaves_the_others_applied() {
    let db = db();
    let mut api = populated_api();
    api.failing.insert("events");
    let sync = manager(&db, Arc::new(api));

    let report = sync.sync_from_backend(77).await.unwrap();
    assert_eq!(report.failed_resources, vec!["events"]);
    assert_eq!(report.users_created, 2);
    // RSVPs reference the unfetched event and are skipped, not errored.
    assert_eq!(report.rsvps_added, 0);
    assert!(report.prefs_applied);
}

#[tokio::test]
async fn failed_notifications_fetch_never_wipes_local_rows() {
    let db = db();
    let ada = db
        .create_user(NewUser {
            username: "ada".to_string(),
            email: "ada@x.com".to_string(),
            firebase_uid: Some("uid-ada".to_string()),
        })
        .await
        .unwrap();
    db.create_notification(ada.user_id, "local-only".to_string(), None)
        .await
        .unwrap();

    let mut api = populated_api();
    api.failing.insert("notifications");
    let sync = manager(&db, Arc::new(api));
    let report = sync.sync_from_backend(77).await.unwrap();

    assert_eq!(report.failed_resources, vec!["notifications"]);
    let rows = db.get_notifications_for_user(ada.user_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].notif_msg, "local-only");
}

#[tokio::test]
async fn existing_user_is_matched_by_email_and_gains_the_uid() {
    let db = db();
    let local = db
        .create_user(NewUser {
            username: "ada".to_string(),
            email: "ada@x.com".to_string(),
            firebase_uid: None,
        })
        .await
        .unwrap();

    let sync = manager(&db, Arc::new(populated_api()));
    let report = sync.sync_from_backend(77).await.unwrap();

    assert_eq!(report.users_created, 1); // bob only
    assert_eq!(report.users_linked, 1);
    let ada = db.get_user_by_id(local.user_id).await.unwrap().unwrap();
    assert_eq!(ada.firebase_uid.as_deref(), Some("uid-ada"));
}

#[tokio::test]
async fn post_pull_cleanup_merges_local_duplicates() {
    let db = db();
    // Two local accounts that normalize to the same gmail address.
    for email in ["a.da@gmail.com", "ada+alt@gmail.com"] {
        db.create_user(NewUser {
            username: "ada".to_string(),
            email: email.to_string(),
            firebase_uid: None,
        })
        .await
        .unwrap();
    }

    let sync = manager(&db, Arc::new(FakeApi::default()));
    let report = sync.sync_from_backend(1).await.unwrap();

    assert_eq!(report.duplicates_merged, 1);
    assert_eq!(db.get_all_users().await.unwrap().len(), 1);
}

// ============================================================================
// AutoSync
// ============================================================================

#[tokio::test(start_paused = true)]
async fn auto_sync_runs_immediately_then_on_the_interval() {
    let api = Arc::new(FakeApi::default());
    let sync = Arc::new(manager(&db(), api.clone()));
    let auto = AutoSync::new(sync, Duration::from_secs(60));

    auto.start(1).await;
    assert!(auto.is_running());
    assert_eq!(api.user_fetches(), 1);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(api.user_fetches() >= 2);

    auto.stop();
    assert!(!auto.is_running());
    let settled = api.user_fetches();
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(api.user_fetches(), settled);
}

#[tokio::test(start_paused = true)]
async fn restart_replaces_the_previous_loop() {
    let api = Arc::new(FakeApi::default());
    let sync = Arc::new(manager(&db(), api.clone()));
    let auto = AutoSync::new(sync, Duration::from_secs(60));

    auto.start(1).await;
    auto.start(1).await;
    assert!(auto.is_running());
    assert_eq!(api.user_fetches(), 2); // one immediate sync per start

    auto.stop();
    let settled = api.user_fetches();
    tokio::time::sleep(Duration::from_secs(600)).await;
    // The first loop was replaced, not leaked alongside the second.
    assert_eq!(api.user_fetches(), settled);
}
