//! Router-level contract tests: status codes and body shapes, no ffmpeg
//! involved.

use std::net::SocketAddr;
use std::path::Path;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use ffpipe::ffpipe_core::config::{BlobBackend, Config};
use ffpipe::{Engine, api};

fn test_config(root: &Path) -> Config {
    Config {
        max_concurrent_tasks: 2,
        database_url: format!("sqlite://{}", root.join("work.db").display()),
        blob_backend: BlobBackend::Local,
        s3: None,
        blob_local_root: Some(root.join("blobs")),
        temp_dir: root.join("tmp"),
        meta_dir: root.join("meta"),
        ffmpeg_path: "ffmpeg".into(),
        ffprobe_path: "ffprobe".into(),
        bind_addr: "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
    }
}

async fn test_router() -> (axum::Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::start(test_config(dir.path())).await.unwrap();
    (api::router(engine), dir)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_file_status_is_reported_in_band() {
    let (router, _dir) = test_router().await;
    let response = router
        .oneshot(Request::get("/status/ghost").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["fileId"], "ghost");
    assert_eq!(body["status"], "not-found");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_file_lookups_are_404_with_an_error_body() {
    let (router, _dir) = test_router().await;
    let response = router
        .oneshot(Request::get("/files/ghost").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("ghost"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn operations_on_missing_files_are_404() {
    let (router, _dir) = test_router().await;
    let response = router
        .oneshot(json_request(
            "POST",
            "/trim",
            serde_json::json!({ "file_id": "ghost", "start": 5, "duration": 10 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_operation_bodies_are_400() {
    let (router, _dir) = test_router().await;

    let missing_file_id = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/trim",
            serde_json::json!({ "start": 5, "duration": 10 }),
        ))
        .await
        .unwrap();
    assert_eq!(missing_file_id.status(), StatusCode::BAD_REQUEST);

    let empty_merge = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/merge",
            serde_json::json!({ "file_ids": [] }),
        ))
        .await
        .unwrap();
    assert_eq!(empty_merge.status(), StatusCode::BAD_REQUEST);

    let bad_chain_tag = router
        .oneshot(json_request(
            "POST",
            "/chain",
            serde_json::json!({
                "file_id": "ghost",
                "operations": [{ "operation": "explode" }],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(bad_chain_tag.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn diagnostics_start_empty() {
    let (router, _dir) = test_router().await;

    let files = router
        .clone()
        .oneshot(Request::get("/files").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(files.status(), StatusCode::OK);
    assert_eq!(body_json(files).await, serde_json::json!([]));

    let tasks = router
        .oneshot(Request::get("/tasks").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(tasks.status(), StatusCode::OK);
    assert_eq!(body_json(tasks).await, serde_json::json!([]));
}
