//! The HTTP boundary's error conversion (SS7): every lower-level error
//! kind is mapped to one of the taxonomy's kinds here, exactly once,
//! and rendered as the standard envelope's `error` field. No stack
//! traces ever reach a response body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use vca_models::{ErrorBody, ResponseEnvelope};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request rejected: {0}")]
    BadRequest(String),

    #[error("tool execution timed out")]
    ToolTimeout,

    #[error("tool execution failed: {0}")]
    ToolFailure(String),

    #[error("circuit open, retry after {retry_after_secs}s")]
    BreakerOpen { retry_after_secs: u64 },

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_FAILURE",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ToolTimeout => "TOOL_TIMEOUT",
            ApiError::ToolFailure(_) => "TOOL_FAILURE",
            ApiError::BreakerOpen { .. } => "BREAKER_OPEN",
            ApiError::RateLimited => "RATE_LIMITED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ToolTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::ToolFailure(_) => StatusCode::BAD_GATEWAY,
            ApiError::BreakerOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::BreakerOpen { retry_after_secs } => {
                Some(serde_json::json!({ "retry_after": retry_after_secs }))
            }
            _ => None,
        }
    }
}

impl From<vca_validator::ValidationError> for ApiError {
    fn from(e: vca_validator::ValidationError) -> Self {
        ApiError::Validation(e.to_string())
    }
}

impl From<vca_persistence::PersistenceError> for ApiError {
    fn from(e: vca_persistence::PersistenceError) -> Self {
        use vca_persistence::PersistenceError as P;
        match e {
            P::Validation(v) => ApiError::Validation(v.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<vca_tools::ToolError> for ApiError {
    fn from(e: vca_tools::ToolError) -> Self {
        use vca_tools::ToolError as T;
        match e {
            T::UnknownTool(name) => ApiError::NotFound(format!("unknown tool: {name}")),
            T::Timeout(_) => ApiError::ToolTimeout,
            T::BreakerOpen { retry_after_secs, .. } => ApiError::BreakerOpen { retry_after_secs },
            T::Persistence(p) => p.into(),
            other => ApiError::ToolFailure(other.to_string()),
        }
    }
}

impl From<vca_store::StoreError> for ApiError {
    fn from(e: vca_store::StoreError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<vca_integrity::IntegrityError> for ApiError {
    fn from(e: vca_integrity::IntegrityError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
            details: self.details(),
        };
        let envelope = ResponseEnvelope::<()>::err(body, uuid::Uuid::new_v4().to_string(), 0);
        (status, Json(envelope)).into_response()
    }
}
