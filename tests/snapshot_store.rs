//! Snapshot-store persistence and backend selection through `Db::open`.

use std::sync::Arc;

use serde_json::json;

use huddle_db::{
    Db, DbConfig, KeyValueStore, MemoryDocumentStore, MemoryKvStore, NewUser, SnapshotBackend,
    SNAPSHOT_KEY,
};

fn docs() -> Arc<MemoryDocumentStore> {
    Arc::new(MemoryDocumentStore::new())
}

// ============================================================================
// Backend selection
// ============================================================================

#[tokio::test]
async fn open_with_a_valid_path_selects_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let db = Db::open(
        DbConfig {
            sqlite_path: Some(dir.path().join("huddle.db")),
        },
        Arc::new(MemoryKvStore::new()),
        docs(),
    )
    .await;
    assert_eq!(db.status().backend, "sqlite");
    assert!(db.status().initialized);
}

#[tokio::test]
async fn open_with_an_unusable_path_falls_back_to_the_snapshot_store() {
    let dir = tempfile::tempdir().unwrap();
    // The parent directory does not exist, so the open probe fails.
    let bad_path = dir.path().join("missing").join("deep").join("huddle.db");
    let db = Db::open(
        DbConfig {
            sqlite_path: Some(bad_path),
        },
        Arc::new(MemoryKvStore::new()),
        docs(),
    )
    .await;
    assert_eq!(db.status().backend, "snapshot");

    // The handle still works.
    let u = db
        .create_user(NewUser {
            username: "ada".to_string(),
            email: "ada@x.com".to_string(),
            firebase_uid: None,
        })
        .await
        .unwrap();
    assert!(db.get_user_by_id(u.user_id).await.unwrap().is_some());
}

#[tokio::test]
async fn open_without_a_path_uses_the_snapshot_store_directly() {
    let db = Db::open(DbConfig::default(), Arc::new(MemoryKvStore::new()), docs()).await;
    assert_eq!(db.status().backend, "snapshot");
}

// ============================================================================
// Snapshot persistence and repair
// ============================================================================

#[tokio::test]
async fn data_survives_a_reload_from_the_same_kv_store() {
    let kv = Arc::new(MemoryKvStore::new());

    let db = Db::with_backend(Arc::new(SnapshotBackend::load(kv.clone()).await), docs());
    let u = db
        .create_user(NewUser {
            username: "ada".to_string(),
            email: "ada@x.com".to_string(),
            firebase_uid: None,
        })
        .await
        .unwrap();
    drop(db);

    let reopened = Db::with_backend(Arc::new(SnapshotBackend::load(kv).await), docs());
    let found = reopened.get_user_by_id(u.user_id).await.unwrap().unwrap();
    assert_eq!(found.username, "ada");
}

#[tokio::test]
async fn malformed_snapshot_is_repaired_on_load() {
    let kv = Arc::new(MemoryKvStore::new());
    // A hand-mangled blob: one good user, one without an id, a non-array
    // friends table, and no counters at all.
    kv.seed(
        SNAPSHOT_KEY,
        json!({
            "users": [
                { "userId": 7, "username": "ada", "email": "ada@x.com" },
                { "username": "no-id" }
            ],
            "friends": "corrupt",
        }),
    );

    let db = Db::with_backend(Arc::new(SnapshotBackend::load(kv.clone()).await), docs());
    let users = db.get_all_users().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].user_id, 7);
    assert!(db.get_friends_for_user(7).await.unwrap().is_empty());

    // The recomputed counter continues above the surviving max id.
    let next = db
        .create_user(NewUser {
            username: "bob".to_string(),
            email: "bob@x.com".to_string(),
            firebase_uid: None,
        })
        .await
        .unwrap();
    assert!(next.user_id > 7);

    // The repaired shape was written back on first mutation.
    let blob = kv.get_item(SNAPSHOT_KEY).await.unwrap().unwrap();
    assert!(blob["friends"].is_array());
    assert!(blob["nextIds"]["users"].as_i64().unwrap() > next.user_id);
}
