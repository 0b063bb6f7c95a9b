use thiserror::Error;

// ---------------------------------------------------------------------------
// StorageError
// ---------------------------------------------------------------------------

/// Failures inside the local store (either backend or the key-value
/// primitive underneath the fallback snapshot).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("key-value store error: {0}")]
    KeyValue(String),

    #[error("snapshot serialization: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

// ---------------------------------------------------------------------------
// MirrorError
// ---------------------------------------------------------------------------

/// Failures talking to the remote document store. These are only ever
/// observed by the outbox worker, which logs and drops them — entity
/// operations never see a `MirrorError`.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("document store error: {0}")]
    Store(String),
}

// ---------------------------------------------------------------------------
// SyncError
// ---------------------------------------------------------------------------

/// Failures in the pull-sync path (REST transport or local apply).
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::Transport(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// DbError — top-level rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Mirror(#[from] MirrorError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        DbError::Storage(StorageError::Sqlite(e))
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Storage(StorageError::Serialize(e))
    }
}

/// Convenience alias — the default error type is `DbError`.
pub type Result<T, E = DbError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_error_display() {
        let e = StorageError::KeyValue("disk full".to_string());
        assert_eq!(e.to_string(), "key-value store error: disk full");
    }

    #[test]
    fn mirror_error_display() {
        let e = MirrorError::Store("permission denied".to_string());
        assert!(e.to_string().contains("permission denied"));
    }

    #[test]
    fn db_error_from_storage_error() {
        let e: DbError = StorageError::KeyValue("x".to_string()).into();
        assert!(matches!(e, DbError::Storage(_)));
    }

    #[test]
    fn db_error_from_sync_error() {
        let e: DbError = SyncError::Transport("timeout".to_string()).into();
        assert!(matches!(e, DbError::Sync(_)));
    }
}
