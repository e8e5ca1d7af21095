//! `GET /tools` and `POST /tools/{tool_name}/execute` (SS6, SS4.5).

use std::time::Instant;

use axum::extract::{Extension, Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use vca_models::VideoId;

use crate::error::{ApiError, ApiResult};
use crate::handlers::ok;
use crate::middleware::RequestId;
use crate::security::{validate_parameters_size, validate_video_id};
use crate::state::AppState;

#[derive(Serialize)]
pub struct ToolDescription {
    name: &'static str,
    description: &'static str,
    parameters_schema: serde_json::Value,
}

pub async fn list_tools(
    Extension(RequestId(request_id)): Extension<RequestId>,
    State(state): State<AppState>,
) -> Json<vca_models::ResponseEnvelope<Vec<ToolDescription>>> {
    let start = Instant::now();
    let tools = state
        .dispatcher
        .registry()
        .list()
        .map(|spec| ToolDescription {
            name: spec.name,
            description: spec.description,
            parameters_schema: spec.parameters_schema.clone(),
        })
        .collect();
    ok(tools, request_id, start)
}

#[derive(Deserialize)]
pub struct ExecuteToolRequest {
    video_id: String,
    #[serde(default)]
    parameters: serde_json::Value,
    #[serde(default)]
    idempotency_key: Option<String>,
}

#[derive(Serialize)]
pub struct ExecuteToolResponse {
    status: &'static str,
    result: serde_json::Value,
    cached: bool,
    execution_time: f64,
}

/// `POST /tools/{tool_name}/execute` (SS6): rejects a `video_id`
/// containing path-traversal or control characters and enforces the
/// 1 MB `parameters` cap independent of the 10 MB body limit.
pub async fn execute_tool(
    Extension(RequestId(request_id)): Extension<RequestId>,
    State(state): State<AppState>,
    Path(tool_name): Path<String>,
    Json(body): Json<ExecuteToolRequest>,
) -> ApiResult<Json<vca_models::ResponseEnvelope<ExecuteToolResponse>>> {
    let start = Instant::now();

    validate_video_id(&body.video_id).map_err(ApiError::Validation)?;
    validate_parameters_size(&body.parameters, state.config.max_parameters_size).map_err(ApiError::Validation)?;

    let video_id = VideoId::from_string(body.video_id);
    let outcome = state
        .dispatcher
        .invoke(&tool_name, &video_id, body.parameters, body.idempotency_key)
        .await;

    let response = match outcome {
        Ok(outcome) => {
            crate::metrics::record_tool_invocation(&tool_name, "success", start.elapsed().as_secs_f64());
            ExecuteToolResponse {
                status: "success",
                result: serde_json::to_value(&outcome.counts).unwrap_or_default(),
                cached: outcome.cached,
                execution_time: outcome.execution_time_ms as f64 / 1000.0,
            }
        }
        Err(e) => {
            if matches!(&e, vca_tools::ToolError::BreakerOpen { .. }) {
                crate::metrics::record_breaker_open(&tool_name);
            }
            crate::metrics::record_tool_invocation(&tool_name, "error", start.elapsed().as_secs_f64());
            return Err(e.into());
        }
    };

    Ok(ok(response, request_id, start))
}
