//! Priority queue error types (SS4.7).

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue already shut down")]
    ShuttingDown,

    #[error("job not found: {0}")]
    JobNotFound(String),
}
