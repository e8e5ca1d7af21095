//! Router assembly (SS4.8): global middleware (request id, logging,
//! CORS) wraps every route; the rate limiter applies to the whole API
//! surface, matching SS4.8 step 2's "per client" scope.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::cache::{cache_stats, invalidate_all, invalidate_video};
use crate::handlers::integrity::{check_video, reconcile_video, video_lineage};
use crate::handlers::queue::{get_job, queue_status};
use crate::handlers::root::{health, root};
use crate::handlers::tools::{execute_tool, list_tools};
use crate::handlers::videos::{get_progress, get_status, process_progressive, process_video};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, rate_limit, request_id, request_logging, RateLimiterCache};
use crate::state::AppState;

pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let rate_limiter = Arc::new(RateLimiterCache::new(state.config.rate_limit_rps, state.config.rate_limit_burst));
    let max_body_size = state.config.max_body_size;
    let cors = cors_layer(&state.config.cors_origins);

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/tools", get(list_tools))
        .route("/tools/:tool_name/execute", post(execute_tool))
        .route("/videos/:video_id/process", post(process_video))
        .route("/videos/:video_id/process-progressive", post(process_progressive))
        .route("/videos/:video_id/progress", get(get_progress))
        .route("/videos/:video_id/status", get(get_status))
        .route("/queue/status", get(queue_status))
        .route("/queue/job/:video_id", get(get_job))
        .route("/cache/stats", get(cache_stats))
        .route("/cache", delete(invalidate_all))
        .route("/cache/videos/:video_id", delete(invalidate_video))
        .route("/integrity/videos/:video_id", get(check_video))
        .route("/integrity/videos/:video_id/reconcile", post(reconcile_video))
        .route("/integrity/lineage/:video_id", get(video_lineage))
        .merge(metrics_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn_with_state(Arc::clone(&rate_limiter), rate_limit))
        .layer(RequestBodyLimitLayer::new(max_body_size))
        .layer(middleware::from_fn(request_logging))
        .layer(middleware::from_fn(request_id))
        .layer(cors)
        .with_state(state)
}
