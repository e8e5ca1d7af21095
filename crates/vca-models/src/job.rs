//! The in-process priority-queue Job (SS3, SS4.7).
//!
//! This Job never leaves the process: it lives in the `vca-queue`
//! worker pool's in-memory maps for its entire lifetime, not in an
//! external broker.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{JobId, VideoId};

/// Lower numeric value sorts first (HIGH jumps the queue ahead of
/// already-queued NORMAL/LOW jobs, but never preempts a running one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    High = 1,
    Normal = 2,
    Low = 3,
}

impl Default for JobPriority {
    fn default() -> Self {
        JobPriority::Normal
    }
}

impl JobPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPriority::High => "high",
            JobPriority::Normal => "normal",
            JobPriority::Low => "low",
        }
    }
}

impl std::str::FromStr for JobPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(JobPriority::High),
            "normal" => Ok(JobPriority::Normal),
            "low" => Ok(JobPriority::Low),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Processing,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }
}

/// A unit of work inside the priority queue.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub job_id: JobId,
    pub video_id: VideoId,
    pub video_path: String,
    pub priority: JobPriority,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    pub fn new(video_id: VideoId, video_path: impl Into<String>, priority: JobPriority) -> Self {
        Self {
            job_id: JobId::new(),
            video_id,
            video_path: video_path.into(),
            priority,
            status: JobStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    pub fn start(mut self) -> Self {
        self.status = JobStatus::Processing;
        self.started_at = Some(Utc::now());
        self
    }

    pub fn complete(mut self) -> Self {
        self.status = JobStatus::Complete;
        self.completed_at = Some(Utc::now());
        self
    }

    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_is_high_first() {
        let mut priorities = vec![JobPriority::Low, JobPriority::High, JobPriority::Normal];
        priorities.sort();
        assert_eq!(priorities, vec![JobPriority::High, JobPriority::Normal, JobPriority::Low]);
    }

    #[test]
    fn job_lifecycle_transitions() {
        let job = Job::new(VideoId::from_string("v1"), "data/videos/a.mp4", JobPriority::Normal);
        assert_eq!(job.status, JobStatus::Queued);

        let started = job.start();
        assert_eq!(started.status, JobStatus::Processing);
        assert!(started.started_at.is_some());

        let completed = started.complete();
        assert_eq!(completed.status, JobStatus::Complete);
        assert!(completed.status.is_terminal());
    }

    #[test]
    fn priority_parses_from_query_string() {
        assert_eq!("high".parse::<JobPriority>().unwrap(), JobPriority::High);
        assert!("urgent".parse::<JobPriority>().is_err());
    }
}
