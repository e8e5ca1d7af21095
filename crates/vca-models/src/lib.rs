//! Shared types for the video context analysis workspace.
//!
//! Every other crate in the workspace depends on this one for IDs, the
//! video/context/lineage/job entities, and the HTTP response envelope.

mod context;
mod envelope;
mod ids;
mod job;
mod lineage;
mod video;

pub use context::{
    CaptionPayload, ContextPayload, ContextRecord, ContextType, DetectedObject, FramePayload,
    IdempotencyPayload, ObjectDetectionPayload, TranscriptPayload,
};
pub use envelope::{ErrorBody, ResponseEnvelope, ResponseMetadata};
pub use ids::{ContextId, JobId, LineageId, VideoId};
pub use job::{Job, JobPriority, JobStatus};
pub use lineage::{LineageOperation, LineageRecord};
pub use video::{ProcessingStatus, Video};
