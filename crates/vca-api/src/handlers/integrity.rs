//! `GET /integrity/videos/{video_id}`, `POST
//! /integrity/videos/{video_id}/reconcile`, `GET
//! /integrity/lineage/{video_id}` (SS6, SS4.9): a thin HTTP face over
//! the batch integrity tooling, not a second write path.

use std::time::Instant;

use axum::extract::{Extension, Path, State};
use axum::Json;
use vca_models::VideoId;

use crate::error::ApiResult;
use crate::handlers::ok;
use crate::middleware::RequestId;
use crate::state::AppState;

pub async fn check_video(
    Extension(RequestId(request_id)): Extension<RequestId>,
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> ApiResult<Json<vca_models::ResponseEnvelope<vca_integrity::ConsistencyReport>>> {
    let start = Instant::now();
    crate::security::validate_video_id(&video_id).map_err(crate::error::ApiError::Validation)?;

    let video_id = VideoId::from_string(video_id);
    let report = state.checker.check_video(&video_id).await?;
    Ok(ok(report, request_id, start))
}

pub async fn reconcile_video(
    Extension(RequestId(request_id)): Extension<RequestId>,
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> ApiResult<Json<vca_models::ResponseEnvelope<vca_integrity::ReconcileOutcome>>> {
    let start = Instant::now();
    crate::security::validate_video_id(&video_id).map_err(crate::error::ApiError::Validation)?;

    let video_id = VideoId::from_string(video_id);
    let outcome = state.reconciler.reconcile(&video_id).await?;
    Ok(ok(outcome, request_id, start))
}

pub async fn video_lineage(
    Extension(RequestId(request_id)): Extension<RequestId>,
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> ApiResult<Json<vca_models::ResponseEnvelope<Vec<vca_models::LineageRecord>>>> {
    let start = Instant::now();
    crate::security::validate_video_id(&video_id).map_err(crate::error::ApiError::Validation)?;

    let video_id = VideoId::from_string(video_id);
    let records = state.lineage.for_video(&video_id).await?;
    Ok(ok(records, request_id, start))
}
