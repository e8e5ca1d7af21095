//! `GET /cache/stats`, `DELETE /cache`, `DELETE /cache/videos/{video_id}`
//! (SS6, SS4.3).

use std::time::Instant;

use axum::extract::{Extension, Path, State};
use axum::Json;
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::handlers::ok;
use crate::middleware::RequestId;
use crate::state::AppState;

#[derive(Serialize)]
pub struct CacheStatsResponse {
    hits: u64,
    misses: u64,
    l1_hits: u64,
    l2_hits: u64,
    l3_hits: u64,
}

pub async fn cache_stats(
    Extension(RequestId(request_id)): Extension<RequestId>,
    State(state): State<AppState>,
) -> Json<vca_models::ResponseEnvelope<CacheStatsResponse>> {
    let start = Instant::now();
    let stats = state.cache.stats();
    ok(
        CacheStatsResponse {
            hits: stats.hits,
            misses: stats.misses,
            l1_hits: stats.l1_hits,
            l2_hits: stats.l2_hits,
            l3_hits: stats.l3_hits,
        },
        request_id,
        start,
    )
}

/// `DELETE /cache`: invalidates the entire `tool` namespace (every
/// dispatcher cache entry, across every video and tool).
pub async fn invalidate_all(
    Extension(RequestId(request_id)): Extension<RequestId>,
    State(state): State<AppState>,
) -> Json<vca_models::ResponseEnvelope<serde_json::Value>> {
    let start = Instant::now();
    state.cache.invalidate_pattern("tool", "*").await;
    ok(serde_json::json!({ "invalidated": true }), request_id, start)
}

/// `DELETE /cache/videos/{video_id}` (SS4.3 `invalidate_pattern`):
/// pattern-scoped to every cache key that starts with this video's id.
pub async fn invalidate_video(
    Extension(RequestId(request_id)): Extension<RequestId>,
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> ApiResult<Json<vca_models::ResponseEnvelope<serde_json::Value>>> {
    let start = Instant::now();
    crate::security::validate_video_id(&video_id).map_err(ApiError::Validation)?;

    let pattern = format!("*:{video_id}:*");
    state.cache.invalidate_pattern("tool", &pattern).await;
    Ok(ok(
        serde_json::json!({ "invalidated": true, "video_id": video_id }),
        request_id,
        start,
    ))
}
