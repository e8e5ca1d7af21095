//! Progressive processor error types (SS4.6).

use thiserror::Error;

pub type ProcessorResult<T> = Result<T, ProcessorError>;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Tool(#[from] vca_tools::ToolError),

    #[error(transparent)]
    Store(#[from] vca_store::StoreError),

    #[error("stage {0} failed: {1}")]
    StageFailed(&'static str, String),
}
