//! Storage layer: the backend trait, the two implementations, and the
//! key-value primitive the fallback persists through.

pub mod kv;
pub mod snapshot;
pub mod sqlite;
pub mod traits;

pub use kv::{KeyValueStore, MemoryKvStore};
pub use snapshot::{SnapshotBackend, SNAPSHOT_KEY};
pub use sqlite::SqliteBackend;
pub use traits::StoreBackend;
