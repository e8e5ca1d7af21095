//! The standard HTTP response envelope (SS6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub execution_time_ms: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub metadata: ResponseMetadata,
}

impl<T> ResponseEnvelope<T> {
    pub fn ok(data: T, request_id: impl Into<String>, execution_time_ms: u128) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata: ResponseMetadata {
                request_id: request_id.into(),
                timestamp: Utc::now(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                execution_time_ms,
            },
        }
    }

    pub fn err(error: ErrorBody, request_id: impl Into<String>, execution_time_ms: u128) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            metadata: ResponseMetadata {
                request_id: request_id.into(),
                timestamp: Utc::now(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                execution_time_ms,
            },
        }
    }
}
