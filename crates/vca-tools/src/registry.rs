//! Component E: the tool registry (SS4.5).
//!
//! Polymorphism here is a dispatch table keyed by name, not a class
//! hierarchy (SS9) - each `ToolSpec` is a plain value holding a name, a
//! description, a `schemars`-derived parameter schema for the `/tools`
//! introspection endpoint, and a boxed async invocation closure.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use schemars::schema_for;
use serde_json::Value;
use vca_models::{
    CaptionPayload, ContextPayload, FramePayload, ObjectDetectionPayload, TranscriptPayload, VideoId,
};
use vca_store::{SqlValue, Store, StoreError};

use crate::error::{ToolError, ToolResult};
use crate::rpc::ToolRunnerClient;
use crate::schema::{CaptionFramesParams, DetectObjectsParams, ExtractFramesParams, TranscribeAudioParams};

const TOOL_VERSION: &str = "1.0.0";

/// What one tool invocation produced, ready to hand to the persistence
/// service (SS4.4).
pub struct ToolOutcome {
    pub payloads: Vec<ContextPayload>,
    pub tool_version: String,
    pub model_version: Option<String>,
}

/// The one coupling a tool is allowed to the store (SS4.5): reading
/// back previously-extracted frames when its own parameters omit them.
pub struct ToolContext {
    pub video_id: VideoId,
    pub store: Arc<Store>,
    pub rpc: Arc<ToolRunnerClient>,
}

type ToolFuture = Pin<Box<dyn Future<Output = ToolResult<ToolOutcome>> + Send>>;
type ToolFn = dyn Fn(ToolContext, Value) -> ToolFuture + Send + Sync;

pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters_schema: Value,
    execute: Arc<ToolFn>,
}

impl ToolSpec {
    pub fn invoke(&self, ctx: ToolContext, params: Value) -> ToolFuture {
        (self.execute)(ctx, params)
    }
}

pub struct ToolRegistry {
    tools: HashMap<&'static str, ToolSpec>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        let mut tools = HashMap::new();
        for spec in [
            extract_frames_spec(),
            caption_frames_spec(),
            transcribe_audio_spec(),
            detect_objects_spec(),
        ] {
            tools.insert(spec.name, spec);
        }
        Self { tools }
    }

    pub fn get(&self, name: &str) -> ToolResult<&ToolSpec> {
        self.tools.get(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }

    pub fn list(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.values()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn extract_frames_spec() -> ToolSpec {
    ToolSpec {
        name: "extract_frames",
        description: "Extracts representative frames from a video at a fixed sampling interval.",
        parameters_schema: serde_json::to_value(schema_for!(ExtractFramesParams)).unwrap(),
        execute: Arc::new(|ctx, params| Box::pin(extract_frames(ctx, params))),
    }
}

async fn extract_frames(ctx: ToolContext, params: Value) -> ToolResult<ToolOutcome> {
    let params: ExtractFramesParams = serde_json::from_value(params)?;
    let frames = match params.frames {
        Some(frames) => frames,
        None => {
            ctx.rpc
                .invoke::<Vec<FramePayload>>(
                    "extract_frames",
                    ctx.video_id.as_str(),
                    serde_json::json!({
                        "interval_seconds": params.interval_seconds,
                        "max_frames": params.max_frames,
                    }),
                )
                .await?
        }
    };
    Ok(ToolOutcome {
        payloads: frames.into_iter().map(ContextPayload::Frame).collect(),
        tool_version: TOOL_VERSION.to_string(),
        model_version: None,
    })
}

fn caption_frames_spec() -> ToolSpec {
    ToolSpec {
        name: "caption_frames",
        description: "Generates a natural-language caption for each previously-extracted frame.",
        parameters_schema: serde_json::to_value(schema_for!(CaptionFramesParams)).unwrap(),
        execute: Arc::new(|ctx, params| Box::pin(caption_frames(ctx, params))),
    }
}

async fn caption_frames(ctx: ToolContext, params: Value) -> ToolResult<ToolOutcome> {
    let params: CaptionFramesParams = serde_json::from_value(params)?;
    let captions = match params.captions {
        Some(captions) => captions,
        None => {
            let frame_timestamps = load_frame_timestamps(&ctx).await?;
            ctx.rpc
                .invoke::<Vec<CaptionPayload>>(
                    "caption_frames",
                    ctx.video_id.as_str(),
                    serde_json::json!({ "frame_timestamps": frame_timestamps }),
                )
                .await?
        }
    };
    Ok(ToolOutcome {
        payloads: captions.into_iter().map(ContextPayload::Caption).collect(),
        tool_version: TOOL_VERSION.to_string(),
        model_version: None,
    })
}

fn transcribe_audio_spec() -> ToolSpec {
    ToolSpec {
        name: "transcribe_audio",
        description: "Transcribes the video's audio track into timestamped segments.",
        parameters_schema: serde_json::to_value(schema_for!(TranscribeAudioParams)).unwrap(),
        execute: Arc::new(|ctx, params| Box::pin(transcribe_audio(ctx, params))),
    }
}

async fn transcribe_audio(ctx: ToolContext, params: Value) -> ToolResult<ToolOutcome> {
    let params: TranscribeAudioParams = serde_json::from_value(params)?;
    let segments = match params.transcript {
        Some(segments) => segments,
        None => {
            ctx.rpc
                .invoke::<Vec<TranscriptPayload>>("transcribe_audio", ctx.video_id.as_str(), serde_json::json!({}))
                .await?
        }
    };
    Ok(ToolOutcome {
        payloads: segments.into_iter().map(ContextPayload::Transcript).collect(),
        tool_version: TOOL_VERSION.to_string(),
        model_version: None,
    })
}

fn detect_objects_spec() -> ToolSpec {
    ToolSpec {
        name: "detect_objects",
        description: "Detects and classifies objects present in each previously-extracted frame.",
        parameters_schema: serde_json::to_value(schema_for!(DetectObjectsParams)).unwrap(),
        execute: Arc::new(|ctx, params| Box::pin(detect_objects(ctx, params))),
    }
}

async fn detect_objects(ctx: ToolContext, params: Value) -> ToolResult<ToolOutcome> {
    let params: DetectObjectsParams = serde_json::from_value(params)?;
    let detections = match params.objects {
        Some(detections) => detections,
        None => {
            let frame_timestamps = load_frame_timestamps(&ctx).await?;
            ctx.rpc
                .invoke::<Vec<ObjectDetectionPayload>>(
                    "detect_objects",
                    ctx.video_id.as_str(),
                    serde_json::json!({ "frame_timestamps": frame_timestamps }),
                )
                .await?
        }
    };
    Ok(ToolOutcome {
        payloads: detections.into_iter().map(ContextPayload::Object).collect(),
        tool_version: TOOL_VERSION.to_string(),
        model_version: None,
    })
}

async fn load_frame_timestamps(ctx: &ToolContext) -> ToolResult<Vec<f64>> {
    let store = Arc::clone(&ctx.store);
    let video_id = ctx.video_id.as_str().to_string();
    run_blocking(move || {
        store.execute_query(
            "SELECT timestamp FROM video_context \
             WHERE video_id = ?1 AND context_type = 'frame' AND timestamp IS NOT NULL \
             ORDER BY timestamp ASC",
            &[SqlValue::Text(video_id)],
            |row| row.get::<_, f64>(0),
        )
    })
    .await
}

async fn run_blocking<F, T>(f: F) -> ToolResult<T>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ToolError::RunnerError(format!("blocking task join error: {e}")))?
        .map_err(ToolError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_the_four_analysis_tools() {
        let registry = ToolRegistry::new();
        assert_eq!(registry.len(), 4);
        assert!(registry.get("extract_frames").is_ok());
        assert!(registry.get("caption_frames").is_ok());
        assert!(registry.get("transcribe_audio").is_ok());
        assert!(registry.get("detect_objects").is_ok());
    }

    #[test]
    fn unknown_tool_name_is_rejected() {
        let registry = ToolRegistry::new();
        assert!(matches!(registry.get("not_a_tool"), Err(ToolError::UnknownTool(_))));
    }

    #[test]
    fn parameters_schema_is_exported_per_tool() {
        let registry = ToolRegistry::new();
        let spec = registry.get("extract_frames").unwrap();
        assert!(spec.parameters_schema.is_object());
    }
}
