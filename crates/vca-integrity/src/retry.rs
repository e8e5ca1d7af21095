//! Retry-with-DLQ (SS4.9): the same fixed backoff schedule the
//! Persistence Service uses for its write path (500ms, 1s, 2s), wrapped
//! around one video's reconciliation. Exhausting the schedule appends
//! the video to the dead-letter list rather than surfacing a bare
//! error, since reconciliation is a batch/background operation with no
//! caller waiting synchronously.

use std::time::Duration;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::Serialize;
use tracing::warn;
use vca_models::VideoId;

use crate::error::IntegrityError;
use crate::reconciliation::{ReconcileOutcome, Reconciler};

const BACKOFF_SCHEDULE_MS: [u64; 3] = [500, 1000, 2000];

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DeadLetterEntry {
    pub video_id: String,
    pub reason: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct DeadLetterQueue {
    entries: std::sync::Mutex<Vec<DeadLetterEntry>>,
}

impl DeadLetterQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: DeadLetterEntry) {
        self.entries.lock().unwrap().push(entry);
    }

    pub fn list(&self) -> Vec<DeadLetterEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Retries `reconciler.reconcile(video_id)` over the fixed schedule;
/// on final exhaustion records a `DeadLetterEntry` and returns
/// `IntegrityError::RetriesExhausted`.
pub async fn reconcile_with_retry(
    reconciler: &Reconciler,
    dlq: &DeadLetterQueue,
    video_id: &VideoId,
) -> Result<ReconcileOutcome, IntegrityError> {
    let mut last_error = None;

    for (attempt, delay_ms) in BACKOFF_SCHEDULE_MS.iter().enumerate() {
        match reconciler.reconcile(video_id).await {
            Ok(outcome) if outcome.errors.is_empty() => return Ok(outcome),
            Ok(outcome) => {
                let reason = format!("{:?}", outcome.errors);
                warn!(video_id = %video_id, attempt = attempt + 1, delay_ms, reason, "reconciliation left tool errors, retrying");
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                last_error = Some(reason);
            }
            Err(e) => {
                warn!(video_id = %video_id, attempt = attempt + 1, delay_ms, error = %e, "reconciliation attempt failed, retrying");
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                last_error = Some(e.to_string());
            }
        }
    }

    let attempts = BACKOFF_SCHEDULE_MS.len() as u32 + 1;
    let reason = last_error.unwrap_or_else(|| "unknown failure".to_string());
    dlq.push(DeadLetterEntry {
        video_id: video_id.as_str().to_string(),
        reason: reason.clone(),
        attempts,
        failed_at: Utc::now(),
    });
    Err(IntegrityError::RetriesExhausted { video_id: video_id.as_str().to_string(), attempts, reason })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_letter_queue_accumulates_entries() {
        let dlq = DeadLetterQueue::new();
        assert!(dlq.is_empty());
        dlq.push(DeadLetterEntry {
            video_id: "v1".into(),
            reason: "boom".into(),
            attempts: 4,
            failed_at: Utc::now(),
        });
        assert_eq!(dlq.len(), 1);
        assert_eq!(dlq.list()[0].video_id, "v1");
    }
}
