//! The HTTP surface binary: wires an `AppState`, starts the priority
//! queue's workers, and serves the router with graceful shutdown.

use std::net::SocketAddr;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vca_api::{create_router, metrics, ApiConfig, AppState};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    let use_json = std::env::var("LOG_FORMAT").map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false);
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let env_filter =
        EnvFilter::from_default_env().add_directive(format!("vca={log_level}").parse().unwrap());

    if use_json {
        tracing_subscriber::registry().with(fmt::layer().json()).with(env_filter).init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }

    let config = ApiConfig::from_env();
    info!(host = %config.host, port = config.port, "starting vca-api");

    let state = match AppState::new(config.clone()) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "failed to build application state");
            std::process::exit(1);
        }
    };

    state.queue.spawn_workers();

    let metrics_enabled = std::env::var("METRICS_ENABLED").map(|v| v != "0" && v.to_lowercase() != "false").unwrap_or(true);
    let metrics_handle = if metrics_enabled {
        info!("prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics())
    } else {
        None
    };

    let app = create_router(state.clone(), metrics_handle);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse().expect("invalid bind address");

    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await.expect("failed to bind listener");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .expect("server error");

    info!("server shutdown complete");
}

async fn shutdown_signal(state: AppState) {
    tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    info!("received shutdown signal, draining priority queue");
    state.queue.shutdown(std::time::Duration::from_secs(30)).await;
}
