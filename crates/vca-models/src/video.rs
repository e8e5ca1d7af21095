//! The Video entity (SS3).

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::VideoId;

/// Per-stage processing status, owned exclusively by the progressive
/// processor. Uses the literal per-stage names rather than a single
/// generic `processing` placeholder so `GET /videos/{id}/status` can
/// report which stage a video is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    #[default]
    Pending,
    Extracting,
    Captioning,
    Analyzing,
    Complete,
    Error,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Extracting => "extracting",
            ProcessingStatus::Captioning => "captioning",
            ProcessingStatus::Analyzing => "analyzing",
            ProcessingStatus::Complete => "complete",
            ProcessingStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Complete | ProcessingStatus::Error)
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Video {
    pub video_id: VideoId,
    pub filename: String,
    pub file_path: String,
    pub duration_seconds: f64,
    pub upload_time: DateTime<Utc>,
    #[serde(default)]
    pub processing_status: ProcessingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Video {
    pub fn new(video_id: VideoId, filename: impl Into<String>, file_path: impl Into<String>, duration_seconds: f64) -> Self {
        Self {
            video_id,
            filename: filename.into(),
            file_path: file_path.into(),
            duration_seconds,
            upload_time: Utc::now(),
            processing_status: ProcessingStatus::Pending,
            thumbnail_path: None,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn with_status(mut self, status: ProcessingStatus) -> Self {
        self.processing_status = status;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_video_starts_pending() {
        let v = Video::new(VideoId::new(), "a.mp4", "/tmp/a.mp4", 12.5);
        assert_eq!(v.processing_status, ProcessingStatus::Pending);
        assert!(!v.is_deleted());
    }

    #[test]
    fn terminal_statuses() {
        assert!(ProcessingStatus::Complete.is_terminal());
        assert!(ProcessingStatus::Error.is_terminal());
        assert!(!ProcessingStatus::Extracting.is_terminal());
    }
}
