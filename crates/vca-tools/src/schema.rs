//! JSON-schema-exportable parameter contracts for the four registered
//! tools (SS4.5), exported to the `/tools` introspection endpoint via
//! `schemars`.
//!
//! Each params struct carries an optional pre-computed results field
//! (`frames`, `captions`, `transcript`, `objects`). When present, the
//! tool uses it directly instead of calling the tool runner - the same
//! escape hatch SS8's scenarios rely on to exercise validation and
//! persistence deterministically without a live model backend.

use schemars::JsonSchema;
use serde::Deserialize;
use vca_models::{CaptionPayload, FramePayload, ObjectDetectionPayload, TranscriptPayload};

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub struct ExtractFramesParams {
    #[serde(default)]
    pub interval_seconds: Option<f64>,
    #[serde(default)]
    pub max_frames: Option<u32>,
    #[serde(default)]
    pub frames: Option<Vec<FramePayload>>,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub struct CaptionFramesParams {
    #[serde(default)]
    pub captions: Option<Vec<CaptionPayload>>,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub struct TranscribeAudioParams {
    #[serde(default)]
    pub transcript: Option<Vec<TranscriptPayload>>,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub struct DetectObjectsParams {
    #[serde(default)]
    pub objects: Option<Vec<ObjectDetectionPayload>>,
}
