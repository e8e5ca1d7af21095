//! Tool registry & dispatcher error types (SS4.5, SS7).

use thiserror::Error;

pub type ToolResult<T> = Result<T, ToolError>;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool execution timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("circuit open for tool {tool_name}, retry after {retry_after_secs}s")]
    BreakerOpen { tool_name: String, retry_after_secs: u64 },

    #[error("tool runner request failed: {0}")]
    Rpc(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Persistence(#[from] vca_persistence::PersistenceError),

    #[error(transparent)]
    Store(#[from] vca_store::StoreError),

    #[error("tool runner returned an error response: {0}")]
    RunnerError(String),
}

impl ToolError {
    /// Transient-looking RPC failures count against the circuit breaker
    /// and are worth retrying; anything else (bad request, unknown tool,
    /// serialization bugs) is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ToolError::Rpc(e) => e.is_timeout() || e.is_connect() || e.status().map(|s| s.is_server_error()).unwrap_or(false),
            ToolError::Timeout(_) => true,
            ToolError::RunnerError(_) => true,
            _ => false,
        }
    }
}
