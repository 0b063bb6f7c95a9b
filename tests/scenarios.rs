//! End-to-end scenario: two users befriend each other, plan an event, and
//! RSVP, with the mirror converging along the way.

use std::sync::Arc;

use serde_json::json;

use huddle_db::{
    Db, DocumentStore, MemoryDocumentStore, MemoryKvStore, NewEvent, NewRsvp, NewUser, RsvpStatus,
    SnapshotBackend, SqliteBackend, StoreBackend,
};

async fn backends() -> Vec<Arc<dyn StoreBackend>> {
    vec![
        Arc::new(SqliteBackend::open_in_memory().expect("open in-memory DB")),
        Arc::new(SnapshotBackend::load(Arc::new(MemoryKvStore::new())).await),
    ]
}

#[tokio::test]
async fn alice_and_bob_plan_a_picnic() {
    for backend in backends().await {
        let docs = Arc::new(MemoryDocumentStore::new());
        let db = Db::with_backend(backend, docs.clone());

        let alice = db
            .create_user(NewUser {
                username: "alice".to_string(),
                email: "alice@x.com".to_string(),
                firebase_uid: Some("uid-alice".to_string()),
            })
            .await
            .unwrap();
        let bob = db
            .create_user(NewUser {
                username: "bob".to_string(),
                email: "bob@x.com".to_string(),
                firebase_uid: Some("uid-bob".to_string()),
            })
            .await
            .unwrap();

        // Friendship.
        let request = db
            .send_friend_request(alice.user_id, bob.user_id)
            .await
            .unwrap();
        db.respond_friend_request(request.friend_row_id, true)
            .await
            .unwrap();
        assert_eq!(
            db.get_friends_for_user(bob.user_id).await.unwrap()[0].username,
            "alice"
        );

        // Alice plans the picnic and invites Bob.
        let picnic = db
            .create_event(NewEvent {
                user_id: alice.user_id,
                event_title: Some("picnic".to_string()),
                date: "2026-09-05".to_string(),
                start_time: "12:00".to_string(),
                end_time: "14:00".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let invite = db
            .create_rsvp(NewRsvp {
                event_id: picnic.event_id,
                event_owner_id: alice.user_id,
                invite_recipient_id: bob.user_id,
                status: RsvpStatus::Pending,
            })
            .await
            .unwrap();
        db.create_notification(
            bob.user_id,
            "alice invited you to picnic".to_string(),
            Some("invite".to_string()),
        )
        .await
        .unwrap();

        // Bob sees the invite and accepts.
        let bobs_rsvps = db.get_rsvps_for_user(bob.user_id).await.unwrap();
        assert_eq!(bobs_rsvps.len(), 1);
        db.update_rsvp(invite.rsvp_id, RsvpStatus::Accepted)
            .await
            .unwrap();

        // Alice's view of the event shows the accepted guest.
        let replies = db.get_rsvps_for_event(picnic.event_id).await.unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].status, RsvpStatus::Accepted);
        assert_eq!(replies[0].invite_recipient_id, bob.user_id);

        // The mirror converged to the same picture.
        db.flush_mirror().await;
        let event_doc = docs
            .get("events", &picnic.event_id.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event_doc["eventTitle"], json!("picnic"));
        let rsvp_doc = docs
            .get("rsvps", &invite.rsvp_id.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rsvp_doc["status"], json!("accepted"));
    }
}
