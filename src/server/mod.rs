pub mod handlers;
pub mod types;

use crate::{
    Result,
    config::{Config, ServerConfig},
    upstream::OllamaClient,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use handlers::AppState;
use std::{any::Any, net::SocketAddr, path::Path, sync::Arc};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::{error, info};
use types::ApiError;

/// Builds the full gateway router: API routes, uploaded files, and the
/// application shell for every other GET.
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    let uploads = ServeDir::new(state.uploads.dir());

    let static_dir = Path::new(&config.static_dir);
    let shell = ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html")));

    Router::new()
        .route("/api/models", get(handlers::list_models))
        .route("/api/models/pull", post(handlers::pull_model))
        .route("/api/models/:model", get(handlers::show_model))
        .route("/api/generate", post(handlers::generate))
        .route("/api/generate/stream", post(handlers::generate_stream))
        .route("/api/chat", post(handlers::chat))
        .route(
            "/api/upload",
            post(handlers::upload).layer(DefaultBodyLimit::max(config.max_upload_bytes)),
        )
        .route("/health", get(handlers::health))
        .with_state(state)
        .nest_service("/uploads", uploads)
        .fallback_service(shell)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "unknown panic".to_string()
    };

    error!("Server error: {}", details);
    ApiError::internal(details).into_response()
}

pub async fn run(config: Config) -> Result<()> {
    let backend = OllamaClient::new(&config.upstream)?;
    let app_state = AppState::new(&config, Arc::new(backend)).await?;

    let app = create_router(app_state, &config.server);

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Ollama gateway running on {}", addr);
    info!("Connected to Ollama API at {}", config.upstream.base_url);
    info!("Web interface available at http://localhost:{}", config.server.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
