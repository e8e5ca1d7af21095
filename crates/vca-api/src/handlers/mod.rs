//! Component H handlers, one module per SS6 endpoint group.

pub mod cache;
pub mod integrity;
pub mod queue;
pub mod root;
pub mod tools;
pub mod videos;

use std::time::Instant;

use axum::Json;
use vca_models::ResponseEnvelope;

pub fn ok<T: serde::Serialize>(data: T, request_id: String, start: Instant) -> Json<ResponseEnvelope<T>> {
    Json(ResponseEnvelope::ok(data, request_id, start.elapsed().as_millis()))
}
