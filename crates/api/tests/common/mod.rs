#![allow(dead_code)]

use std::path::PathBuf;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use assistant_api::config::ServerConfig;
use assistant_api::router::build_app_router;
use assistant_api::state::AppState;

/// The workflow template shipped with the server.
pub const BUNDLED_WORKFLOW: &str = include_str!("../../assets/comfy_workflow.json");

/// Build a test `ServerConfig` with safe defaults.
///
/// Polling is shortened to 20ms x 5 attempts so timeouts resolve quickly.
/// No Gemini key is configured.
pub fn test_config(workflow_path: PathBuf, comfyui_url: &str) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        gemini_api_key: None,
        gemini_model: "test-model".to_string(),
        gemini_base_url: "http://127.0.0.1:9".to_string(),
        comfyui_url: comfyui_url.to_string(),
        workflow_path,
        poll_interval_ms: 20,
        max_poll_attempts: 5,
        session_idle_ttl_secs: 3600,
        max_sessions: 100,
    }
}

/// Build the full application router, with the same middleware stack
/// production uses.
pub fn build_test_app(config: ServerConfig) -> Router {
    build_app_router(AppState::new(config.clone()), &config)
}

/// Write `contents` as the workflow template inside `dir`.
pub fn write_workflow(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("comfy_workflow.json");
    std::fs::write(&path, contents).unwrap();
    path
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn delete(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Create a session and return its id.
pub async fn create_session(app: &Router) -> String {
    let response = post_json(app, "/api/v1/sessions", serde_json::json!({})).await;
    assert_eq!(response.status(), 201);
    body_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string()
}

pub fn messages_uri(session_id: &str) -> String {
    format!("/api/v1/sessions/{session_id}/messages")
}
