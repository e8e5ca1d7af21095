//! Store error types.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection pool exhausted: no connection available within timeout")]
    PoolTimeout,

    #[error("schema version mismatch: on-disk {on_disk}, expected {expected}")]
    SchemaMismatch { on_disk: i64, expected: i64 },

    #[error("integrity check failed: {0}")]
    IntegrityFailure(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("blocking task join error: {0}")]
    Join(String),

    #[error("internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn pool_timeout() -> Self {
        StoreError::PoolTimeout
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        StoreError::Internal(msg.into())
    }

    /// Transient errors are worth retrying with backoff (SQLITE_BUSY,
    /// SQLITE_LOCKED, pool exhaustion); anything else (constraint
    /// violations, schema mismatches) is fatal and should surface
    /// immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::PoolTimeout => true,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}
