//! Persistence service error types.

use thiserror::Error;

pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("validation failed: {0}")]
    Validation(#[from] vca_validator::ValidationError),

    #[error(transparent)]
    Store(#[from] vca_store::StoreError),

    #[error("unknown tool name: {0}")]
    UnknownTool(String),

    #[error("row count did not advance by the expected batch size for video {video_id} ({context_type})")]
    ShortWrite {
        video_id: String,
        context_type: String,
    },

    #[error("blocking task panicked: {0}")]
    Join(String),

    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<PersistenceError>,
    },
}

impl PersistenceError {
    /// Transient store errors are worth retrying through the service's
    /// own backoff loop (SS4.4 step 7); everything else is fatal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PersistenceError::Store(e) if e.is_transient())
    }
}
