//! HTTP API — the `/api` surface of the RAG runtime.
//!
//! Endpoints:
//!
//! - `POST /api/ask`                 — Answer a question as an SSE stream
//! - `GET  /api/tools`               — Tool catalog
//! - `POST /api/tool/execute`        — Run a tool and ingest its output
//! - `POST /api/search`              — Ranked chunks with neighbours
//! - `POST /api/add-text`            — Ingest raw text
//! - `POST /api/add-wiki`            — Ingest a Wikipedia article
//! - `GET  /api/stats`, `/api/sources`, `POST /api/sources/delete`
//! - `GET  /api/chats`, `POST /api/chats/new`, `GET|DELETE /api/chat/{id}`
//! - `GET|POST /api/settings`, `POST /api/settings/theme`
//! - `GET|POST /api/settings/apis`, `POST /api/settings/apis/delete`
//! - `GET|POST /api/personas`, `POST /api/personas/delete`
//! - `GET|POST /api/llm/list-models`, `GET /api/discover`
//! - `POST /api/sandbox`, `POST /api/calc`

use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use tinyrag_agent::{
    ContextAssembler, ExecutionGate, RetrievalPolicy, Session, SessionError, SessionEvent, SessionRequest,
};
use tinyrag_config::{ConfigError, CustomApi, Persona};
use tinyrag_core::error::ToolError;
use tinyrag_core::message::Conversation;
use tinyrag_core::retrieval::DebugChunk;
use tinyrag_core::store::{ArticleCount, InsertOutcome};
use tinyrag_core::tool::{ToolDescriptor, ToolRequest};
use tinyrag_memory::chunk_text;
use tinyrag_providers::{EndpointProbe, build_from_settings};
use tinyrag_tools::{SandboxLimits, WebClient, WikipediaTool, build_registry, calculator, run_sandboxed};

use crate::{AppState, SharedState};

/// Upper bound for a caller-chosen sandbox timeout.
const MAX_SANDBOX_TIMEOUT_SECS: u64 = 60;

const EMBED_MODEL_CHANGE_WARNING: &str = "Du hast das Embedding-Modell geändert. Bestehende Chunks wurden mit dem alten Modell eingebettet; Retrieval kann schlechter werden. Wenn du fortfährst, solltest du die Wissensbasis neu einbetten (oder die DB leeren).";

// ── Router ────────────────────────────────────────────────────────────────

pub fn api_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/ask", post(ask_handler))
        .route("/api/tools", get(list_tools_handler))
        .route("/api/tool/execute", post(execute_tool_handler))
        .route("/api/search", post(search_handler))
        .route("/api/add-text", post(add_text_handler))
        .route("/api/add-wiki", post(add_wiki_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/sources", get(list_sources_handler))
        .route("/api/sources/delete", post(delete_source_handler))
        .route("/api/chats", get(list_chats_handler))
        .route("/api/chats/new", post(new_chat_handler))
        .route("/api/chat/{id}", get(get_chat_handler).delete(delete_chat_handler))
        .route("/api/settings", get(get_settings_handler).post(update_settings_handler))
        .route("/api/settings/theme", post(set_theme_handler))
        .route("/api/settings/apis", get(list_apis_handler).post(add_api_handler))
        .route("/api/settings/apis/delete", post(delete_api_handler))
        .route("/api/personas", get(list_personas_handler).post(add_persona_handler))
        .route("/api/personas/delete", post(delete_persona_handler))
        .route("/api/llm/list-models", get(current_models_handler).post(list_models_handler))
        .route("/api/discover", get(discover_handler))
        .route("/api/sandbox", post(sandbox_handler))
        .route("/api/calc", post(calc_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

fn internal(e: impl ToString) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, e)
}

fn config_error(e: ConfigError) -> ApiError {
    match e {
        ConfigError::ValidationError(msg) => api_error(StatusCode::BAD_REQUEST, msg),
        other => internal(other),
    }
}

#[derive(Serialize, Deserialize)]
struct Ack {
    ok: bool,
}

/// Counts reported by every ingestion endpoint.
#[derive(Serialize, Deserialize)]
struct IngestSummary {
    chars: usize,
    chunks: usize,
    /// The article already existed; nothing was written
    skipped: bool,
    total: usize,
}

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(default)]
    query: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Deserialize)]
struct AddTextRequest {
    #[serde(default)]
    title: String,
    #[serde(default)]
    text: String,
}

#[derive(Serialize, Deserialize)]
struct AddTextResponse {
    title: String,
    #[serde(flatten)]
    summary: IngestSummary,
}

#[derive(Deserialize)]
struct AddWikiRequest {
    #[serde(default, alias = "title")]
    article: String,
    /// Defaults to the settings language
    #[serde(default)]
    lang: String,
}

#[derive(Serialize, Deserialize)]
struct AddWikiResponse {
    article: String,
    #[serde(flatten)]
    summary: IngestSummary,
}

#[derive(Serialize, Deserialize)]
struct ToolExecuteResponse {
    tool: String,
    query: String,
    source: String,
    #[serde(flatten)]
    summary: IngestSummary,
}

#[derive(Serialize, Deserialize)]
struct StatsResponse {
    chunks: usize,
    sources: Vec<ArticleCount>,
}

#[derive(Deserialize)]
struct ArticleRequest {
    #[serde(default)]
    article: String,
}

#[derive(Serialize, Deserialize)]
struct DeleteSourceResponse {
    deleted: String,
    removed: usize,
    total: usize,
}

#[derive(Default, Deserialize)]
struct NewChatRequest {
    #[serde(default)]
    persona_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct SettingsView {
    base_url: String,
    chat_model: String,
    embed_model: String,
    lang: String,
    theme: String,
    chunk_size: i64,
    k: i64,
    allow_code_exec: bool,
    allow_sandbox: bool,
}

#[derive(Deserialize)]
struct UpdateSettingsRequest {
    #[serde(default)]
    base_url: String,
    #[serde(default)]
    chat_model: String,
    #[serde(default)]
    embed_model: String,
    #[serde(default)]
    theme: Option<String>,
    #[serde(default)]
    lang: Option<String>,
    #[serde(default)]
    chunk_size: Option<i64>,
    #[serde(default)]
    k: Option<i64>,
    #[serde(default)]
    allow_code_exec: Option<bool>,
    #[serde(default)]
    allow_sandbox: Option<bool>,
    /// Accept an embedding model change although chunks exist
    #[serde(default)]
    force: bool,
}

#[derive(Serialize, Deserialize)]
struct ForceRequired {
    ok: bool,
    requires_force: bool,
    message: String,
}

#[derive(Deserialize)]
struct ThemeRequest {
    #[serde(default)]
    theme: String,
}

#[derive(Serialize, Deserialize)]
struct ThemeResponse {
    ok: bool,
    theme: String,
}

#[derive(Deserialize)]
struct AddApiRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    template: String,
    #[serde(default)]
    desc: String,
}

#[derive(Deserialize)]
struct AddPersonaRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    prompt: String,
}

#[derive(Deserialize)]
struct IdRequest {
    #[serde(default)]
    id: String,
}

#[derive(Deserialize)]
struct ListModelsRequest {
    #[serde(default)]
    base_url: String,
}

#[derive(Serialize, Deserialize)]
struct DiscoverResponse {
    candidates: Vec<EndpointProbe>,
}

#[derive(Deserialize)]
struct SandboxRequest {
    #[serde(default)]
    source: String,
    #[serde(default)]
    timeout_s: Option<u64>,
}

#[derive(Serialize, Deserialize)]
struct SandboxResponse {
    ok: bool,
    output: String,
}

#[derive(Deserialize)]
struct CalcRequest {
    #[serde(default)]
    expr: String,
}

#[derive(Serialize, Deserialize)]
struct CalcResponse {
    expr: String,
    result: f64,
    formatted: String,
}

// ── Ask (SSE) ─────────────────────────────────────────────────────────────

/// `POST /api/ask` — answer a question, streaming [`SessionEvent`]s.
///
/// Tokens are sent as unnamed `data:` lines and completion as `data: [DONE]`;
/// every other event is named and carries JSON.
async fn ask_handler(
    State(state): State<SharedState>,
    Json(request): Json<SessionRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    if request.question.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "missing question"));
    }
    info!(mode = request.mode().as_str(), "api/ask SSE request");

    let session = Session::new(
        state.provider.current(),
        state.store.clone(),
        state.chats.clone(),
        state.settings.snapshot(),
    )
    .with_retrieval(state.config.retrieval.clone())
    .with_tools(state.config.tools.clone());

    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        match session.run(request, &tx).await {
            Ok(outcome) => debug!(request_id = %outcome.request_id, chat_id = %outcome.chat_id, "Session complete"),
            Err(SessionError::Disconnected) => info!("Client went away, session abandoned"),
            Err(e) => {
                warn!(error = %e, "Session failed");
                let _ = tx.send(SessionEvent::Error { message: e.to_string() }).await;
                let _ = tx.send(SessionEvent::Done).await;
            }
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| Ok(to_sse(&event)));
    Ok(Sse::new(stream))
}

fn to_sse(event: &SessionEvent) -> SseEvent {
    match event {
        // SSE cannot carry bare carriage returns.
        SessionEvent::Token { content } => SseEvent::default().data(content.replace('\r', "")),
        SessionEvent::Done => SseEvent::default().data("[DONE]"),
        other => {
            let data = serde_json::to_string(other).unwrap_or_default();
            SseEvent::default().event(other.event_type()).data(data)
        }
    }
}

// ── Tools ─────────────────────────────────────────────────────────────────

async fn list_tools_handler(State(state): State<SharedState>) -> Result<Json<Vec<ToolDescriptor>>, ApiError> {
    let registry = build_registry(&state.settings.snapshot(), &state.config.tools, state.provider.current())
        .map_err(internal)?;
    Ok(Json(registry.descriptors()))
}

/// `POST /api/tool/execute` — run one tool under the execution policy and
/// ingest its output under the tool's article name.
async fn execute_tool_handler(
    State(state): State<SharedState>,
    Json(request): Json<ToolRequest>,
) -> Result<Json<ToolExecuteResponse>, ApiError> {
    if request.tool.trim().is_empty() || request.query.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "missing tool or query"));
    }

    let settings = state.settings.snapshot();
    let registry = build_registry(&settings, &state.config.tools, state.provider.current()).map_err(internal)?;
    if registry.get(&request.tool).is_none() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("unknown tool: {}", request.tool),
        ));
    }

    let gate = ExecutionGate::from_settings(&settings, SandboxLimits::from_config(&state.config.tools));
    let output = gate.run(&registry, &request).await.map_err(|e| match e {
        ToolError::PermissionDenied { reason, .. } => api_error(StatusCode::FORBIDDEN, reason),
        other => {
            warn!(tool = %request.tool, error = %other, "Tool execution failed");
            internal(format!("Tool {:?} fehlgeschlagen: {other}", request.tool))
        }
    })?;

    let summary = ingest(&state, &output.source, &output.text).await?;
    Ok(Json(ToolExecuteResponse {
        tool: request.tool,
        query: request.query,
        source: output.source,
        summary,
    }))
}

// ── Retrieval & ingestion ─────────────────────────────────────────────────

async fn search_handler(
    State(state): State<SharedState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Vec<DebugChunk>>, ApiError> {
    if request.query.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "missing query"));
    }
    let k = request
        .k
        .filter(|k| *k > 0)
        .unwrap_or_else(|| state.settings.snapshot().k());
    let assembler = ContextAssembler::new(state.store.clone(), RetrievalPolicy::from(&state.config.retrieval));
    let provider = state.provider.current();
    let chunks = assembler
        .search(provider.as_ref(), &request.query, k)
        .await
        .map_err(internal)?;
    Ok(Json(chunks))
}

async fn add_text_handler(
    State(state): State<SharedState>,
    Json(request): Json<AddTextRequest>,
) -> Result<Json<AddTextResponse>, ApiError> {
    if request.text.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "missing text"));
    }
    let title = match request.title.trim() {
        "" => format!("manual-{}", chrono::Utc::now().timestamp()),
        title => title.to_string(),
    };
    let summary = ingest(&state, &title, &request.text).await?;
    Ok(Json(AddTextResponse { title, summary }))
}

async fn add_wiki_handler(
    State(state): State<SharedState>,
    Json(request): Json<AddWikiRequest>,
) -> Result<Json<AddWikiResponse>, ApiError> {
    let article = request.article.trim().to_string();
    if article.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "missing article"));
    }
    let lang = match request.lang.trim() {
        "" => state.settings.snapshot().lang,
        lang => lang.to_string(),
    };

    let web = WebClient::new(Duration::from_secs(state.config.tools.http_timeout_secs)).map_err(internal)?;
    let text = WikipediaTool::new(web, &lang).fetch(&article).await.map_err(|e| {
        warn!(article = %article, lang = %lang, error = %e, "Wikipedia fetch failed");
        api_error(StatusCode::BAD_GATEWAY, e)
    })?;

    let summary = ingest(&state, &article, &text).await?;
    Ok(Json(AddWikiResponse { article, summary }))
}

/// Chunk `text` with the current chunk size and store it under `article`.
async fn ingest(state: &AppState, article: &str, text: &str) -> Result<IngestSummary, ApiError> {
    let chunks = chunk_text(text, state.settings.snapshot().chunk_size());
    let provider = state.provider.current();
    let outcome = state
        .store
        .insert(provider.as_ref(), article, &chunks)
        .await
        .map_err(internal)?;
    let total = state.store.count_all().await.map_err(internal)?;
    Ok(IngestSummary {
        chars: text.len(),
        chunks: chunks.len(),
        skipped: matches!(outcome, InsertOutcome::Skipped { .. }),
        total,
    })
}

async fn stats_handler(State(state): State<SharedState>) -> Result<Json<StatsResponse>, ApiError> {
    Ok(Json(StatsResponse {
        chunks: state.store.count_all().await.map_err(internal)?,
        sources: state.store.list_articles().await.map_err(internal)?,
    }))
}

async fn list_sources_handler(State(state): State<SharedState>) -> Result<Json<Vec<ArticleCount>>, ApiError> {
    Ok(Json(state.store.list_articles().await.map_err(internal)?))
}

async fn delete_source_handler(
    State(state): State<SharedState>,
    Json(request): Json<ArticleRequest>,
) -> Result<Json<DeleteSourceResponse>, ApiError> {
    if request.article.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "missing article"));
    }
    let removed = state.store.delete_article(&request.article).await.map_err(internal)?;
    info!(article = %request.article, removed, "Source deleted");
    Ok(Json(DeleteSourceResponse {
        deleted: request.article,
        removed,
        total: state.store.count_all().await.map_err(internal)?,
    }))
}

// ── Conversations ─────────────────────────────────────────────────────────

async fn list_chats_handler(State(state): State<SharedState>) -> Json<Vec<Conversation>> {
    Json(state.chats.list().await)
}

/// `POST /api/chats/new` — the body is optional.
async fn new_chat_handler(State(state): State<SharedState>, body: Bytes) -> Result<Json<Conversation>, ApiError> {
    let request: NewChatRequest = serde_json::from_slice(&body).unwrap_or_default();
    let conv = state.chats.create(request.persona_id).await.map_err(internal)?;
    Ok(Json(conv))
}

async fn get_chat_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Conversation>, ApiError> {
    state
        .chats
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "not found"))
}

async fn delete_chat_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Ack>, ApiError> {
    state.chats.delete(&id).await.map_err(internal)?;
    Ok(Json(Ack { ok: true }))
}

// ── Settings ──────────────────────────────────────────────────────────────

async fn get_settings_handler(State(state): State<SharedState>) -> Json<SettingsView> {
    let s = state.settings.snapshot();
    Json(SettingsView {
        base_url: s.base_url,
        chat_model: s.chat_model,
        embed_model: s.embed_model,
        lang: s.lang,
        theme: s.theme,
        chunk_size: s.chunk_size,
        k: s.k,
        allow_code_exec: s.allow_code_exec,
        allow_sandbox: s.allow_sandbox,
    })
}

/// `POST /api/settings` — validate the new backend, persist, then swap the
/// active client.
///
/// Changing the embedding model while chunks exist needs `force`, since
/// stored vectors were produced by the old model.
async fn update_settings_handler(
    State(state): State<SharedState>,
    Json(request): Json<UpdateSettingsRequest>,
) -> Result<Response, ApiError> {
    let base_url = tinyrag_config::normalize_base_url(&request.base_url);
    let chat_model = request.chat_model.trim().to_string();
    let embed_model = request.embed_model.trim().to_string();
    if base_url.is_empty() || chat_model.is_empty() || embed_model.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "base_url, chat_model and embed_model are required",
        ));
    }
    if request.chunk_size.is_some_and(|v| v <= 0) || request.k.is_some_and(|v| v <= 0) {
        return Err(api_error(StatusCode::BAD_REQUEST, "chunk_size and k must be positive"));
    }

    let current = state.settings.snapshot();
    let mut next = current.clone();
    next.base_url = base_url;
    next.chat_model = chat_model;
    next.embed_model = embed_model;

    let provider = build_from_settings(&next, state.config.request_timeout())
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("LLM endpoint not reachable: {e}")))?;
    match provider.health_check().await {
        Ok(true) => {}
        Ok(false) => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "LLM endpoint not reachable: unexpected status",
            ));
        }
        Err(e) => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                format!("LLM endpoint not reachable: {e}"),
            ));
        }
    }

    let embed_changed = !current.embed_model.is_empty() && current.embed_model != next.embed_model;
    if embed_changed && !request.force && state.store.count_all().await.map_err(internal)? > 0 {
        warn!(old = %current.embed_model, new = %next.embed_model, "Embedding model change needs force");
        let body = ForceRequired {
            ok: false,
            requires_force: true,
            message: EMBED_MODEL_CHANGE_WARNING.into(),
        };
        return Ok((StatusCode::CONFLICT, Json(body)).into_response());
    }

    state
        .settings
        .update(|s| {
            s.base_url = next.base_url.clone();
            s.chat_model = next.chat_model.clone();
            s.embed_model = next.embed_model.clone();
            if let Some(theme) = request.theme.filter(|t| !t.is_empty()) {
                s.theme = theme;
            }
            if let Some(lang) = request.lang.filter(|l| !l.trim().is_empty()) {
                s.lang = lang;
            }
            if let Some(chunk_size) = request.chunk_size {
                s.chunk_size = chunk_size;
            }
            if let Some(k) = request.k {
                s.k = k;
            }
            if let Some(allow) = request.allow_code_exec {
                s.allow_code_exec = allow;
            }
            if let Some(allow) = request.allow_sandbox {
                s.allow_sandbox = allow;
            }
        })
        .map_err(config_error)?;
    state.provider.swap(provider);

    Ok(Json(Ack { ok: true }).into_response())
}

async fn set_theme_handler(
    State(state): State<SharedState>,
    Json(request): Json<ThemeRequest>,
) -> Result<Json<ThemeResponse>, ApiError> {
    state.settings.set_theme(&request.theme).map_err(config_error)?;
    Ok(Json(ThemeResponse {
        ok: true,
        theme: request.theme,
    }))
}

async fn list_apis_handler(State(state): State<SharedState>) -> Json<Vec<CustomApi>> {
    Json(state.settings.apis())
}

async fn add_api_handler(
    State(state): State<SharedState>,
    Json(request): Json<AddApiRequest>,
) -> Result<Json<CustomApi>, ApiError> {
    let api = state
        .settings
        .add_api(&request.name, &request.template, &request.desc)
        .map_err(config_error)?;
    info!(id = %api.id, name = %api.name, "Custom API added");
    Ok(Json(api))
}

async fn delete_api_handler(
    State(state): State<SharedState>,
    Json(request): Json<IdRequest>,
) -> Result<Json<Ack>, ApiError> {
    if request.id.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "missing id"));
    }
    match state.settings.remove_api(&request.id).map_err(config_error)? {
        true => Ok(Json(Ack { ok: true })),
        false => Err(api_error(StatusCode::NOT_FOUND, "not found")),
    }
}

async fn list_personas_handler(State(state): State<SharedState>) -> Json<Vec<Persona>> {
    Json(state.settings.personas())
}

async fn add_persona_handler(
    State(state): State<SharedState>,
    Json(request): Json<AddPersonaRequest>,
) -> Result<Json<Persona>, ApiError> {
    let persona = state
        .settings
        .add_persona(&request.name, &request.prompt)
        .map_err(config_error)?;
    Ok(Json(persona))
}

async fn delete_persona_handler(
    State(state): State<SharedState>,
    Json(request): Json<IdRequest>,
) -> Result<Json<Ack>, ApiError> {
    if request.id.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "missing id"));
    }
    match state.settings.remove_persona(&request.id).map_err(config_error)? {
        true => Ok(Json(Ack { ok: true })),
        false => Err(api_error(StatusCode::NOT_FOUND, "not found")),
    }
}

// ── Backend discovery ─────────────────────────────────────────────────────

/// `GET /api/llm/list-models` — models of the active backend.
async fn current_models_handler(State(state): State<SharedState>) -> Json<EndpointProbe> {
    let base_url = state.settings.snapshot().base_url;
    Json(tinyrag_providers::probe(&base_url, state.config.request_timeout()).await)
}

/// `POST /api/llm/list-models` — models of any endpoint, before saving it.
async fn list_models_handler(
    State(state): State<SharedState>,
    Json(request): Json<ListModelsRequest>,
) -> Result<Json<EndpointProbe>, ApiError> {
    let base_url = tinyrag_config::normalize_base_url(&request.base_url);
    if base_url.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "missing base_url"));
    }
    Ok(Json(tinyrag_providers::probe(&base_url, state.config.request_timeout()).await))
}

async fn discover_handler(State(state): State<SharedState>) -> Json<DiscoverResponse> {
    let candidates = tinyrag_providers::discover(state.config.request_timeout()).await;
    Json(DiscoverResponse { candidates })
}

// ── Sandbox & calculator ──────────────────────────────────────────────────

async fn sandbox_handler(
    State(state): State<SharedState>,
    Json(request): Json<SandboxRequest>,
) -> Result<Json<SandboxResponse>, ApiError> {
    if request.source.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "missing source"));
    }
    if !state.settings.snapshot().allow_sandbox {
        return Err(api_error(StatusCode::FORBIDDEN, "sandbox execution disabled in settings"));
    }

    let mut limits = SandboxLimits::from_config(&state.config.tools);
    if let Some(secs) = request.timeout_s.filter(|s| *s > 0) {
        limits.timeout = Duration::from_secs(secs.min(MAX_SANDBOX_TIMEOUT_SECS));
    }
    let output = run_sandboxed("sandbox", &request.source, limits)
        .await
        .map_err(|e| match e {
            ToolError::InvalidArguments(msg) => api_error(StatusCode::BAD_REQUEST, msg),
            other => internal(other),
        })?;
    Ok(Json(SandboxResponse { ok: true, output }))
}

async fn calc_handler(Json(request): Json<CalcRequest>) -> Result<Json<CalcResponse>, ApiError> {
    let expr = request.expr.trim().to_string();
    if expr.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "missing expr"));
    }
    let result = calculator::evaluate(&expr).map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
    Ok(Json(CalcResponse {
        formatted: calculator::format_number(result),
        expr,
        result,
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────────
