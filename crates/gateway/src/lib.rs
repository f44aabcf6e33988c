//! HTTP API gateway for tinyRAG.
//!
//! Exposes the question-answering session as an SSE endpoint plus JSON
//! endpoints for ingestion, search, conversations, personas, custom APIs
//! and backend settings.
//!
//! Built on Axum for high performance async HTTP.

pub mod api;

use axum::extract::DefaultBodyLimit;
use axum::{Router, response::Json, routing::get};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::info;

use tinyrag_config::{AppConfig, SettingsStore};
use tinyrag_core::store::ChunkStore;
use tinyrag_memory::{ChatStore, InMemoryChunkStore};
use tinyrag_providers::ProviderHandle;

/// Everything the handlers share.
pub struct AppState {
    pub config: AppConfig,
    pub settings: SettingsStore,
    pub provider: ProviderHandle,
    pub store: Arc<dyn ChunkStore>,
    pub chats: Arc<ChatStore>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Open the settings, chunk store and chat store named by `config`
    /// and connect to the configured backend.
    pub async fn open(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let settings = SettingsStore::load_or_create(&config.storage.settings_path, &config.backend)?;
        let snapshot = settings.snapshot();
        let provider = tinyrag_providers::build_from_settings(&snapshot, config.request_timeout())?;

        let store = open_chunk_store(&config.storage.db_path).await?;
        let chats = Arc::new(ChatStore::open(&config.storage.chats_path));

        info!(
            store = store.name(),
            base_url = %snapshot.base_url,
            chat_model = %snapshot.chat_model,
            embed_model = %snapshot.embed_model,
            "Runtime ready"
        );

        Ok(Self {
            config,
            settings,
            provider: ProviderHandle::new(provider),
            store,
            chats,
        })
    }
}

/// SQLite at `db_path`, or an in-memory store when the path is empty.
async fn open_chunk_store(db_path: &str) -> Result<Arc<dyn ChunkStore>, Box<dyn std::error::Error>> {
    if db_path.is_empty() {
        return Ok(Arc::new(InMemoryChunkStore::new()));
    }
    if let Some(parent) = std::path::Path::new(db_path).parent()
        && !parent.as_os_str().is_empty()
        && !db_path.contains(":memory:")
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Arc::new(tinyrag_memory::SqliteChunkStore::new(db_path).await?))
}

/// Build the full router.
///
/// Layers applied:
/// - CORS (permissive; the API is meant for a local UI)
/// - Request body size limit from `[server] body_limit_bytes`
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .merge(api::api_router(state))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::open(config).await?);
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(api::tests::test_state(&dir));

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn in_memory_store_for_empty_path() {
        let store = open_chunk_store("").await.unwrap();
        assert_eq!(store.name(), "in_memory");
    }
}
