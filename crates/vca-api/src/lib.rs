//! Component H: the HTTP surface (SS4.8, SS6). Wires the request/response
//! boundary over the rest of the workspace - the tool registry and
//! dispatcher (E), the progressive processor (F), the priority queue
//! (G), the cache (C), and the persistence service (D) - applying rate
//! limiting, request validation, and the standard response envelope at
//! every endpoint.

mod config;
mod error;
pub mod handlers;
pub mod metrics;
mod middleware;
mod routes;
mod security;
mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
