//! ContextRecord and its payload variants (SS3).

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{ContextId, VideoId};

/// The four analysis-result kinds plus the idempotency sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    Frame,
    Caption,
    Transcript,
    Object,
    Idempotency,
}

impl ContextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextType::Frame => "frame",
            ContextType::Caption => "caption",
            ContextType::Transcript => "transcript",
            ContextType::Object => "object",
            ContextType::Idempotency => "idempotency",
        }
    }
}

impl std::fmt::Display for ContextType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One detected object within a frame (part of `ContextPayload::Object`).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DetectedObject {
    pub class_name: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
}

/// A single extracted frame reference.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FramePayload {
    pub timestamp: f64,
    pub frame_number: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// A caption generated for one frame.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CaptionPayload {
    pub frame_timestamp: f64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

/// One transcript segment.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptPayload {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Object detections for one frame.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ObjectDetectionPayload {
    pub frame_timestamp: f64,
    pub objects: Vec<DetectedObject>,
}

/// Idempotency sentinel: proves `(video_id, tool_name, idempotency_key)`
/// was already processed.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IdempotencyPayload {
    pub tool_name: String,
    pub idempotency_key: String,
}

/// The typed sum of all payload shapes a context record may carry.
/// A dynamic JSON-schema-dictionary approach would lose compile-time
/// shape checking; these are compile-checked constructors instead, and
/// the `data` column in the store still holds the serialized JSON form.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "context_type", rename_all = "snake_case")]
pub enum ContextPayload {
    Frame(FramePayload),
    Caption(CaptionPayload),
    Transcript(TranscriptPayload),
    Object(ObjectDetectionPayload),
    Idempotency(IdempotencyPayload),
}

impl ContextPayload {
    pub fn context_type(&self) -> ContextType {
        match self {
            ContextPayload::Frame(_) => ContextType::Frame,
            ContextPayload::Caption(_) => ContextType::Caption,
            ContextPayload::Transcript(_) => ContextType::Transcript,
            ContextPayload::Object(_) => ContextType::Object,
            ContextPayload::Idempotency(_) => ContextType::Idempotency,
        }
    }

    /// Primary ordering timestamp used for the monotonic-ordering
    /// invariant (SS8 property 2). Idempotency sentinels have none.
    pub fn primary_timestamp(&self) -> Option<f64> {
        match self {
            ContextPayload::Frame(f) => Some(f.timestamp),
            ContextPayload::Caption(c) => Some(c.frame_timestamp),
            ContextPayload::Transcript(t) => Some(t.start),
            ContextPayload::Object(o) => Some(o.frame_timestamp),
            ContextPayload::Idempotency(_) => None,
        }
    }
}

/// One stored analysis result, carrying lineage metadata inline
/// (denormalized onto the row, with the append-only `LineageRecord`
/// kept as a separate audit trail).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ContextRecord {
    pub context_id: ContextId,
    pub video_id: VideoId,
    pub payload: ContextPayload,
    pub created_at: DateTime<Utc>,
    pub tool_name: String,
    pub tool_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_params: Option<serde_json::Value>,
}

impl ContextRecord {
    pub fn context_type(&self) -> ContextType {
        self.payload.context_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_type_round_trips_through_payload() {
        let payload = ContextPayload::Caption(CaptionPayload {
            frame_timestamp: 1.0,
            text: "hello".into(),
            confidence: Some(0.9),
            model_version: None,
        });
        assert_eq!(payload.context_type(), ContextType::Caption);
        assert_eq!(payload.primary_timestamp(), Some(1.0));
    }

    #[test]
    fn idempotency_payload_has_no_timestamp() {
        let payload = ContextPayload::Idempotency(IdempotencyPayload {
            tool_name: "caption_frames".into(),
            idempotency_key: "k1".into(),
        });
        assert_eq!(payload.primary_timestamp(), None);
    }
}
