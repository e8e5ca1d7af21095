//! Progress events (SS4.6): an in-process `tokio::sync::broadcast`
//! channel, since this component never crosses a process boundary.
//! The HTTP surface's polling endpoint and any websocket reader
//! subscribe to the same channel.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use vca_models::VideoId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extracting,
    Captioning,
    Analyzing,
    Complete,
    Error,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extracting => "extracting",
            Stage::Captioning => "captioning",
            Stage::Analyzing => "analyzing",
            Stage::Complete => "complete",
            Stage::Error => "error",
        }
    }
}

/// `{video_id, stage, percent, message, counts}` (SS4.6). Percent
/// advances monotonically across stages: 0 -> 33 -> 66 -> 100.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProgressEvent {
    pub video_id: VideoId,
    pub stage: Stage,
    pub percent: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<std::collections::BTreeMap<String, i64>>,
    pub timestamp: DateTime<Utc>,
}
