//! Reconciliation (SS4.9): given a completeness gap reported by D,
//! re-invokes the missing tool calls through E directly. This crate
//! owns no queue of its own - it is a thin batch driver over A, D, and
//! E, not a second job system, so "LOW priority" is honored by when an
//! operator schedules a reconciliation sweep, not by any runtime
//! priority field (there is none at this layer; see DESIGN.md).

use std::collections::BTreeMap;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::Serialize;
use serde_json::json;
use tracing::warn;
use vca_models::VideoId;
use vca_persistence::PersistenceService;
use vca_store::{SqlValue, Store};
use vca_tools::Dispatcher;

use crate::error::{IntegrityError, IntegrityResult};

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ReconcileOutcome {
    pub video_id: String,
    pub already_complete: bool,
    pub reinvoked: Vec<String>,
    pub errors: BTreeMap<String, String>,
}

fn tool_name_for_missing(context_type: &str) -> Option<&'static str> {
    match context_type {
        "frame" => Some("extract_frames"),
        "caption" => Some("caption_frames"),
        "transcript" => Some("transcribe_audio"),
        "object" => Some("detect_objects"),
        _ => None,
    }
}

pub struct Reconciler {
    dispatcher: Arc<Dispatcher>,
    persistence: Arc<PersistenceService>,
    store: Arc<Store>,
}

impl Reconciler {
    pub fn new(dispatcher: Arc<Dispatcher>, persistence: Arc<PersistenceService>, store: Arc<Store>) -> Self {
        Self { dispatcher, persistence, store }
    }

    /// Idempotent - safe to run repeatedly (SS4.9). Re-derives the
    /// completeness gap each time rather than trusting a cached view,
    /// so a video already reconciled by a concurrent run simply
    /// reports `already_complete`.
    pub async fn reconcile(&self, video_id: &VideoId) -> IntegrityResult<ReconcileOutcome> {
        let report = self.persistence.verify_video_data_completeness(video_id).await?;
        if report.complete {
            return Ok(ReconcileOutcome {
                video_id: video_id.as_str().to_string(),
                already_complete: true,
                reinvoked: Vec::new(),
                errors: BTreeMap::new(),
            });
        }

        let video_path = self.load_video_path(video_id).await?;
        let mut reinvoked = Vec::new();
        let mut errors = BTreeMap::new();

        for missing in &report.missing {
            let Some(tool_name) = tool_name_for_missing(missing) else {
                warn!(video_id = %video_id, context_type = missing, "no reconciliation mapping for context type");
                continue;
            };
            let params = if tool_name == "extract_frames" {
                json!({ "video_path": video_path })
            } else {
                json!({})
            };
            match self.dispatcher.invoke(tool_name, video_id, params, None).await {
                Ok(_) => reinvoked.push(tool_name.to_string()),
                Err(e) => {
                    errors.insert(tool_name.to_string(), e.to_string());
                }
            }
        }

        Ok(ReconcileOutcome {
            video_id: video_id.as_str().to_string(),
            already_complete: false,
            reinvoked,
            errors,
        })
    }

    async fn load_video_path(&self, video_id: &VideoId) -> IntegrityResult<String> {
        let store = Arc::clone(&self.store);
        let id = video_id.as_str().to_string();
        let paths: Vec<String> = tokio::task::spawn_blocking(move || {
            store.execute_query(
                "SELECT file_path FROM videos WHERE video_id = ?1",
                &[SqlValue::Text(id)],
                |row| row.get(0),
            )
        })
        .await
        .expect("blocking task panicked")?;

        paths.into_iter().next().ok_or_else(|| IntegrityError::VideoNotFound(video_id.as_str().to_string()))
    }
}
