use super::types::{ApiError, HealthResponse, UploadResponse};
use crate::{
    Error,
    config::Config,
    relay::StreamingRelay,
    upstream::{
        ChatRequest, GenerateRequest, InferenceBackend, OptionDefaults, PullRequest,
        ensure_chat_message,
    },
    uploads::UploadStorage,
};
use axum::{
    extract::{
        Multipart, Path, State, multipart::MultipartRejection, rejection::JsonRejection,
    },
    response::{IntoResponse, Json, Response},
};
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn InferenceBackend>,
    pub defaults: OptionDefaults,
    pub uploads: Arc<UploadStorage>,
    pub stream_timeout: Duration,
}

impl AppState {
    pub async fn new(config: &Config, backend: Arc<dyn InferenceBackend>) -> crate::Result<Self> {
        let uploads = UploadStorage::new(&config.server.upload_dir).await?;

        Ok(Self {
            backend,
            defaults: OptionDefaults::from_config(&config.upstream),
            uploads: Arc::new(uploads),
            stream_timeout: config.upstream.request_timeout(),
        })
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn json_body<T>(summary: &str, payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::from_error(summary, Error::invalid_body(rejection.body_text())))
}

pub async fn list_models(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    const SUMMARY: &str = "Failed to fetch models";

    let models = state
        .backend
        .list_models()
        .await
        .map_err(|e| ApiError::from_error(SUMMARY, e))?;

    Ok(Json(models))
}

pub async fn show_model(
    State(state): State<AppState>,
    Path(model): Path<String>,
) -> ApiResult<Json<Value>> {
    let info = state
        .backend
        .show_model(&model)
        .await
        .map_err(|e| ApiError::from_error(format!("Failed to fetch info for model {}", model), e))?;

    Ok(Json(info))
}

pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    const SUMMARY: &str = "Failed to generate completion";

    let params = json_body(SUMMARY, payload)?
        .validate()
        .map_err(|e| ApiError::from_error(SUMMARY, e))?
        .with_defaults(&state.defaults);
    info!("Generate request for model {}", params.model);

    let completion = state
        .backend
        .generate(&params)
        .await
        .map_err(|e| ApiError::from_error(SUMMARY, e))?;

    Ok(Json(completion))
}

pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    const SUMMARY: &str = "Failed to process chat completion";

    let params = json_body(SUMMARY, payload)?
        .validate()
        .map_err(|e| ApiError::from_error(SUMMARY, e))?
        .with_defaults(&state.defaults);
    info!(
        "Chat request for model {} with {} messages",
        params.model,
        params.messages.len()
    );

    let reply = state
        .backend
        .chat(&params)
        .await
        .and_then(|reply| ensure_chat_message(&reply).map(|_| reply))
        .map_err(|e| ApiError::from_error(SUMMARY, e))?;

    Ok(Json(reply))
}

pub async fn generate_stream(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> ApiResult<Response> {
    const SUMMARY: &str = "Failed to stream generation";

    let params = json_body(SUMMARY, payload)?
        .validate()
        .map_err(|e| ApiError::from_error(SUMMARY, e))?
        .with_defaults(&state.defaults);

    let body = StreamingRelay::new(state.backend.clone(), state.stream_timeout)
        .open(params)
        .await
        .map_err(|e| ApiError::from_error(SUMMARY, e))?;

    Ok(body.into_response())
}

pub async fn pull_model(
    State(state): State<AppState>,
    payload: Result<Json<PullRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    const SUMMARY: &str = "Failed to pull model";

    let name = json_body(SUMMARY, payload)?
        .validate()
        .map_err(|e| ApiError::from_error(SUMMARY, e))?;
    info!("Pulling model {}", name);

    let status = state
        .backend
        .pull_model(&name)
        .await
        .map_err(|e| ApiError::from_error(SUMMARY, e))?;

    Ok(Json(status))
}

pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    const SUMMARY: &str = "Failed to upload file";
    let upload_error = |message: String| ApiError::from_error(SUMMARY, Error::upload(message));

    let mut multipart = multipart.map_err(|rejection| upload_error(rejection.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| upload_error(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let original_name = field.file_name().unwrap_or("file").to_string();
        let mimetype = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|e| upload_error(e.body_text()))?;

        let stored = state
            .uploads
            .save(&original_name, mimetype.as_deref(), &data)
            .await
            .map_err(|e| ApiError::from_error(SUMMARY, e))?;
        info!("Uploaded {} as {}", stored.original_name, stored.url());

        return Ok(Json(UploadResponse::from(&stored)));
    }

    Err(ApiError::from_error(SUMMARY, Error::validation("file required")))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}
