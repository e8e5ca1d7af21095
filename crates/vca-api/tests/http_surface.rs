//! End-to-end exercise of the HTTP surface (SS6) against a real,
//! temporary SQLite-backed `AppState` - no mocked router, no stubbed
//! handlers. All assertions live in one test function: `AppState::new`
//! reads its sub-configs from process environment variables, and
//! mutating those concurrently across parallel `#[tokio::test]`
//! functions would race.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;
use vca_api::{create_router, ApiConfig, AppState};

fn configure_env(db_path: &std::path::Path) {
    std::env::set_var("VCA_DATABASE_PATH", db_path.to_str().unwrap());
    std::env::set_var("VCA_POOL_SIZE", "2");
    std::env::remove_var("REDIS_URL");
    std::env::set_var("TOOL_RUNNER_URL", "http://127.0.0.1:1");
    std::env::set_var("QUEUE_WORKERS", "1");
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn http_surface_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    configure_env(&dir.path().join("vca_test.sqlite3"));

    let state = AppState::new(ApiConfig::default()).expect("failed to build app state");
    state.store.initialize_schema().expect("schema init");
    let app = create_router(state.clone(), None);

    // GET / reports identity and the four registered tools.
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["registered_tools"], 4);

    // GET /health.
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "healthy");

    // GET /tools lists all four tool contracts.
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/tools").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let tools = json["data"].as_array().unwrap();
    assert_eq!(tools.len(), 4);
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert!(names.contains(&"extract_frames"));
    assert!(names.contains(&"caption_frames"));
    assert!(names.contains(&"transcribe_audio"));
    assert!(names.contains(&"detect_objects"));

    // A video_id with path-traversal characters is rejected before it
    // ever reaches the dispatcher (SS6, SS8 boundary case).
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/videos/..%2Fetc%2Fpasswd/process")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "VALIDATION_FAILURE");

    // An unrecognized video_path extension is rejected by the
    // progressive endpoint before a Job is ever enqueued.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/videos/v1/process-progressive?priority=normal")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"video_path":"data/videos/a.exe"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Empty tools list in batch dispatch is `complete` with no results
    // (SS8 boundary case) - requires a video row to exist first.
    state
        .store
        .execute_update(
            "INSERT INTO videos (video_id, filename, file_path, duration, upload_timestamp) \
             VALUES ('v1', 'a.mp4', 'data/videos/a.mp4', 60.0, '2026-01-01T00:00:00Z')",
            &[],
        )
        .unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/videos/v1/process")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"tools":[]}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "complete");
    assert_eq!(json["data"]["results"].as_object().unwrap().len(), 0);

    // GET /videos/{id}/progress for a video that was never queued.
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/videos/v1/progress").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["processing"], false);

    // GET /videos/{id}/status before any tool has written context.
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/videos/v1/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["complete"], false);

    // GET /queue/status.
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/queue/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["workers"], 1);

    // GET /cache/stats.
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/cache/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // CORS preflight.
    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/tools")
                .header("Origin", "http://localhost:3000")
                .header("Access-Control-Request-Method", "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status() == StatusCode::OK || response.status() == StatusCode::NO_CONTENT);
}
