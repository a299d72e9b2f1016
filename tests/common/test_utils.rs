use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use http_body_util::BodyExt;
use ollama_gateway::{
    config::Config,
    server::{create_router, handlers::AppState},
    upstream::{InferenceBackend, OllamaClient},
};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;

pub const SHELL_HTML: &str = "<!doctype html><title>gateway</title>";

/// Create a test configuration rooted in `dir`, pointing at `upstream_url`
pub fn create_test_config(dir: &TempDir, upstream_url: &str) -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.upload_dir = dir.path().join("uploads").to_string_lossy().to_string();
    config.server.static_dir = dir.path().join("public").to_string_lossy().to_string();
    config.upstream.base_url = upstream_url.to_string();
    config.upstream.request_timeout_ms = 2_000;
    config.upstream.pull_timeout_ms = 10_000;
    config
}

/// Build the router around any backend, with a static shell on disk
pub async fn create_test_app(config: &Config, backend: Arc<dyn InferenceBackend>) -> Router {
    let public = std::path::Path::new(&config.server.static_dir);
    std::fs::create_dir_all(public).unwrap();
    std::fs::write(public.join("index.html"), SHELL_HTML).unwrap();

    let state = AppState::new(config, backend).await.unwrap();
    create_router(state, &config.server)
}

/// Build the router around a real reqwest client talking to `upstream_url`
pub async fn create_http_app(upstream_url: &str) -> (Router, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir, upstream_url);
    let backend = OllamaClient::new(&config.upstream).unwrap();
    let app = create_test_app(&config, Arc::new(backend)).await;
    (app, temp_dir)
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Multipart request carrying a single part named `field`
pub fn multipart_request(field: &str, file_name: &str, mimetype: &str, data: &[u8]) -> Request<Body> {
    let boundary = "gateway-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mimetype).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
