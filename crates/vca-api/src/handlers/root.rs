//! `GET /` and `GET /health` (SS6).

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct ServerIdentity {
    name: &'static str,
    version: &'static str,
    registered_tools: usize,
}

pub async fn root(State(state): State<AppState>) -> Json<ServerIdentity> {
    Json(ServerIdentity {
        name: "vca",
        version: env!("CARGO_PKG_VERSION"),
        registered_tools: state.dispatcher.registry().len(),
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    features: HealthFeatures,
}

#[derive(Serialize)]
pub struct HealthFeatures {
    l2_cache_enabled: bool,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        features: HealthFeatures {
            l2_cache_enabled: state.cache.stats().l2_hits > 0 || std::env::var("REDIS_URL").is_ok(),
        },
    })
}
