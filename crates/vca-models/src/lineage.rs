//! LineageRecord: the append-only audit trail (SS3).

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{ContextId, LineageId, VideoId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LineageOperation {
    Create,
    Reprocess,
}

impl LineageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineageOperation::Create => "create",
            LineageOperation::Reprocess => "reprocess",
        }
    }
}

/// An append-only row describing who produced a context record. Never
/// mutated once written.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LineageRecord {
    pub lineage_id: LineageId,
    pub video_id: VideoId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<ContextId>,
    pub operation: LineageOperation,
    pub tool_name: String,
    pub tool_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl LineageRecord {
    pub fn new_create(
        video_id: VideoId,
        context_id: Option<ContextId>,
        tool_name: impl Into<String>,
        tool_version: impl Into<String>,
    ) -> Self {
        Self {
            lineage_id: LineageId::new(),
            video_id,
            context_id,
            operation: LineageOperation::Create,
            tool_name: tool_name.into(),
            tool_version: tool_version.into(),
            model_version: None,
            parameters: None,
            user_id: None,
            timestamp: Utc::now(),
        }
    }
}
