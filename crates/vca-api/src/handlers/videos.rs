//! Video submission, progress, and status endpoints (SS6, SS4.6, SS4.7).

use std::time::Instant;

use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use vca_models::{JobPriority, VideoId};

use crate::error::{ApiError, ApiResult};
use crate::handlers::ok;
use crate::middleware::RequestId;
use crate::security::validate_video_path;
use crate::state::AppState;

#[derive(Deserialize, Default)]
pub struct ProcessRequest {
    #[serde(default)]
    tools: Option<Vec<String>>,
}

/// `POST /videos/{video_id}/process` (SS6, SS4.5 `process_video`):
/// batch dispatch, returning a partial-success aggregate. An empty
/// `tools` list is `complete` with no results (SS8 boundary case).
pub async fn process_video(
    Extension(RequestId(request_id)): Extension<RequestId>,
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    Json(body): Json<ProcessRequest>,
) -> ApiResult<Json<vca_models::ResponseEnvelope<vca_tools::BatchOutcome>>> {
    let start = Instant::now();
    crate::security::validate_video_id(&video_id).map_err(ApiError::Validation)?;

    let video_id = VideoId::from_string(video_id);
    let outcome = state.dispatcher.process_video(&video_id, body.tools).await;
    Ok(ok(outcome, request_id, start))
}

#[derive(Deserialize)]
pub struct ProcessProgressiveRequest {
    video_path: String,
}

#[derive(Deserialize, Default)]
pub struct PriorityQuery {
    #[serde(default)]
    priority: Option<String>,
}

#[derive(Serialize)]
pub struct EnqueueResponse {
    job_id: String,
    queue_position: usize,
    stage_plan: [&'static str; 3],
}

/// `POST /videos/{video_id}/process-progressive` (SS6, SS4.7
/// `add_job`): enqueues a Job at the requested priority and reports its
/// approximate queue position plus the fixed three-stage plan.
pub async fn process_progressive(
    Extension(RequestId(request_id)): Extension<RequestId>,
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    Query(query): Query<PriorityQuery>,
    Json(body): Json<ProcessProgressiveRequest>,
) -> ApiResult<Json<vca_models::ResponseEnvelope<EnqueueResponse>>> {
    let start = Instant::now();
    crate::security::validate_video_id(&video_id).map_err(ApiError::Validation)?;
    validate_video_path(&body.video_path).map_err(ApiError::Validation)?;

    let priority: JobPriority = query
        .priority
        .as_deref()
        .unwrap_or("normal")
        .parse()
        .map_err(ApiError::Validation)?;

    let video_id = VideoId::from_string(video_id);
    let job = state.queue.add_job(video_id, body.video_path, priority);
    let stats = state.queue.stats();

    Ok(ok(
        EnqueueResponse {
            job_id: job.job_id.to_string(),
            queue_position: stats.pending,
            stage_plan: ["extracting", "captioning", "analyzing"],
        },
        request_id,
        start,
    ))
}

/// `GET /videos/{video_id}/progress` (SS6): the last emitted progress
/// event, or `{processing: false}` once the video has left the active
/// set (SS4.6).
pub async fn get_progress(
    Extension(RequestId(request_id)): Extension<RequestId>,
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> ApiResult<Json<vca_models::ResponseEnvelope<serde_json::Value>>> {
    let start = Instant::now();
    crate::security::validate_video_id(&video_id).map_err(ApiError::Validation)?;

    let video_id = VideoId::from_string(video_id);
    let body = match state.processor.get_progress(&video_id) {
        Some(event) => serde_json::to_value(event).unwrap_or_default(),
        None => serde_json::json!({ "processing": false }),
    };
    Ok(ok(body, request_id, start))
}

/// `GET /videos/{video_id}/status` (SS6, SS4.4
/// `verify_video_data_completeness`).
pub async fn get_status(
    Extension(RequestId(request_id)): Extension<RequestId>,
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> ApiResult<Json<vca_models::ResponseEnvelope<serde_json::Value>>> {
    let start = Instant::now();
    crate::security::validate_video_id(&video_id).map_err(ApiError::Validation)?;

    let video_id = VideoId::from_string(video_id);
    let report = state.persistence.verify_video_data_completeness(&video_id).await?;
    let body = serde_json::json!({
        "counts": report.counts,
        "complete": report.complete,
        "missing": report.missing,
    });
    Ok(ok(body, request_id, start))
}
