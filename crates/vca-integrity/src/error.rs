//! Integrity tooling error types (SS4.9).

use thiserror::Error;

pub type IntegrityResult<T> = Result<T, IntegrityError>;

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error(transparent)]
    Store(#[from] vca_store::StoreError),

    #[error(transparent)]
    Persistence(#[from] vca_persistence::PersistenceError),

    #[error(transparent)]
    Tool(#[from] vca_tools::ToolError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("video not found: {0}")]
    VideoNotFound(String),

    #[error("retries exhausted after {attempts} attempts reconciling {video_id}: {reason}")]
    RetriesExhausted { video_id: String, attempts: u32, reason: String },
}
