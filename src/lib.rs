//! huddle-db: the local data adapter for a social-scheduling app.
//!
//! Local storage is the source of truth. A native SQLite backend is probed
//! at open and a key-value snapshot store covers hosts without it; every
//! successful local write is mirrored best-effort to a remote document
//! store through an outbox, and a pull-sync path folds the REST backend's
//! view back into the local store. A duplicate-account engine detects and
//! merges the accounts that accumulate when sign-in paths disagree.
//!
//! ```no_run
//! use std::sync::Arc;
//! use huddle_db::{Db, DbConfig, MemoryDocumentStore, MemoryKvStore, NewUser};
//!
//! # async fn demo() -> huddle_db::Result<()> {
//! let db = Db::open(
//!     DbConfig { sqlite_path: Some("huddle.db".into()) },
//!     Arc::new(MemoryKvStore::new()),
//!     Arc::new(MemoryDocumentStore::new()),
//! )
//! .await;
//! let user = db
//!     .create_user(NewUser {
//!         username: "ada".into(),
//!         email: "ada@example.com".into(),
//!         firebase_uid: None,
//!     })
//!     .await?;
//! assert!(db.get_user_by_id(user.user_id).await?.is_some());
//! # Ok(())
//! # }
//! ```

pub mod db;
pub mod dedupe;
pub mod error;
pub mod mirror;
pub mod storage;
pub mod sync;
pub mod types;

pub use db::{Db, DbConfig};
pub use dedupe::{
    find_duplicate_groups, normalize_email, CleanupAction, CleanupOptions, CleanupOutcome,
    CleanupReport, DuplicateGroup, MatchRule, MergeReport,
};
pub use error::{DbError, MirrorError, Result, StorageError, SyncError};
pub use mirror::{DocumentStore, EntityKind, MemoryDocumentStore, MirrorJob, Outbox};
pub use storage::{
    KeyValueStore, MemoryKvStore, SnapshotBackend, SqliteBackend, StoreBackend, SNAPSHOT_KEY,
};
pub use sync::{AutoSync, BackendApi, HttpBackendApi, PullReport, SyncManager};
pub use types::{
    AuthHints, DbStatus, Event, EventPatch, FriendRow, FriendStatus, NewEvent, NewRsvp, NewUser,
    Notification, PrefsPatch, Rsvp, RsvpStatus, User, UserPatch, UserPrefs,
};
