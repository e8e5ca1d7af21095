//! `GET /queue/status` and `GET /queue/job/{video_id}` (SS6, SS4.7).

use std::time::Instant;

use axum::extract::{Extension, Path, State};
use axum::Json;
use serde::Serialize;
use vca_models::VideoId;

use crate::error::{ApiError, ApiResult};
use crate::handlers::ok;
use crate::middleware::RequestId;
use crate::state::AppState;

#[derive(Serialize)]
pub struct QueueStatusResponse {
    active_jobs: usize,
    queued_jobs: usize,
    completed_jobs: usize,
    workers: usize,
    shutdown_requested: bool,
}

pub async fn queue_status(
    Extension(RequestId(request_id)): Extension<RequestId>,
    State(state): State<AppState>,
) -> Json<vca_models::ResponseEnvelope<QueueStatusResponse>> {
    let start = Instant::now();
    let stats = state.queue.stats();
    crate::metrics::set_queue_depth(stats.pending as u64);
    ok(
        QueueStatusResponse {
            active_jobs: stats.active,
            queued_jobs: stats.pending,
            completed_jobs: stats.completed,
            workers: state.queue.worker_count(),
            shutdown_requested: state.queue.shutdown_requested(),
        },
        request_id,
        start,
    )
}

pub async fn get_job(
    Extension(RequestId(request_id)): Extension<RequestId>,
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> ApiResult<Json<vca_models::ResponseEnvelope<vca_models::Job>>> {
    let start = Instant::now();
    crate::security::validate_video_id(&video_id).map_err(ApiError::Validation)?;

    let video_id = VideoId::from_string(video_id);
    let job = state
        .queue
        .get_job(&video_id)
        .ok_or_else(|| ApiError::NotFound(format!("no job for video {video_id}")))?;
    Ok(ok(job, request_id, start))
}
