//! Customer-service HTTP server.
//!
//! Exposes the [`RagEngine`] as a JSON API for the chat widget and the
//! admin tooling.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Answer one question: `{response, sources, session_id}` |
//! | `POST` | `/chat/stream` | Answer as Server-Sent Events |
//! | `POST` | `/admin/ingest` | Re-ingest the configured corpus |
//! | `GET`  | `/admin/stats` | Index statistics |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Streaming
//!
//! `/chat/stream` emits one `data:` event per fragment, then a terminal
//! event:
//!
//! ```text
//! data: {"token":"We "}
//! data: {"token":"rent cameras."}
//! data: {"done":true,"sources":["https://example.com/cameras"]}
//! ```
//!
//! A failure after the stream has started is sent as
//! `data: {"error":"..."}` and ends the stream. Failures before the first
//! event use the regular error contract below. When the client disconnects
//! the response body is dropped, which drops the engine stream and closes
//! the upstream completion request.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! | Error | Status | Code |
//! |-------|--------|------|
//! | invalid argument / configuration | 400 | `bad_request` |
//! | context too large | 413 | `context_too_large` |
//! | upstream unavailable | 502 | `upstream_unavailable` |
//! | index failure | 500 | `index_error` |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the chat widget can
//! be embedded on the business website.

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use rental_rag_core::error::RagError;
use rental_rag_core::models::{DocumentFailure, StreamEvent};
use rental_rag_core::rag::RagEngine;

use crate::config::Config;
use crate::corpus::corpus_settings;
use crate::engine::{ingest_corpus, open_engine};

/// Longest accepted chat message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    engine: Arc<RagEngine>,
}

impl AppState {
    pub fn new(config: Config, engine: RagEngine) -> Self {
        Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
        }
    }
}

/// Build the router with every route and the CORS layer.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(handle_chat))
        .route("/chat/stream", post(handle_chat_stream))
        .route("/admin/ingest", post(handle_ingest))
        .route("/admin/stats", get(handle_stats))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Serve on an already-bound listener until the process is terminated.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Starts the HTTP server on `[server].bind`.
///
/// # Returns
///
/// Returns `Ok(())` when the server shuts down, or an error if the engine
/// cannot be built or binding fails.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = open_engine(config).await?;
    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "rental assistant listening");
    println!("Rental assistant listening on http://{}", bind_addr);
    serve(listener, AppState::new(config.clone(), engine)).await
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let (status, code) = match &err {
            RagError::InvalidArgument(_) | RagError::Configuration(_) => {
                (StatusCode::BAD_REQUEST, "bad_request")
            }
            RagError::ContextTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "context_too_large"),
            RagError::UpstreamUnavailable { .. } => (StatusCode::BAD_GATEWAY, "upstream_unavailable"),
            RagError::Index { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "index_error"),
        };
        if status.is_server_error() {
            warn!(error = %err, "request failed");
        }
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

// ============ POST /chat ============

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    k: Option<usize>,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    response: String,
    sources: Vec<String>,
    session_id: String,
}

fn check_message(request: &ChatRequest) -> Result<(), AppError> {
    if request.message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(bad_request(format!(
            "message must be at most {} characters",
            MAX_MESSAGE_CHARS
        )));
    }
    Ok(())
}

/// Echo the caller's session id or mint a fresh one. No state is kept.
fn session_id(request: &ChatRequest) -> String {
    request
        .session_id
        .clone()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    check_message(&request)?;
    let answer = state.engine.answer(&request.message, request.k).await?;
    Ok(Json(ChatResponse {
        response: answer.response,
        sources: answer.sources,
        session_id: session_id(&request),
    }))
}

// ============ POST /chat/stream ============

fn sse_payload(item: &Result<StreamEvent, RagError>) -> serde_json::Value {
    match item {
        Ok(StreamEvent::Token { content }) => serde_json::json!({ "token": content }),
        Ok(StreamEvent::Done { sources }) => serde_json::json!({ "done": true, "sources": sources }),
        Err(e) => serde_json::json!({ "error": e.to_string() }),
    }
}

async fn handle_chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    check_message(&request)?;
    let mut answer = state.engine.answer_stream(&request.message, request.k).await?;

    let events = async_stream::stream! {
        while let Some(item) = answer.next().await {
            let last = item.is_err();
            yield Ok(Event::default().data(sse_payload(&item).to_string()));
            if last {
                break;
            }
        }
    };
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

// ============ POST /admin/ingest ============

#[derive(Debug, Serialize)]
struct IngestResponse {
    status: &'static str,
    documents_ingested: usize,
    chunks_created: usize,
    failures: Vec<DocumentFailure>,
}

async fn handle_ingest(State(state): State<AppState>) -> Result<Json<IngestResponse>, AppError> {
    let corpus = corpus_settings(&state.config, None).map_err(|e| bad_request(e.to_string()))?;
    let report = ingest_corpus(&state.engine, &corpus).await.map_err(|e| {
        match e.downcast::<RagError>() {
            Ok(rag) => AppError::from(rag),
            Err(other) => internal(format!("{:#}", other)),
        }
    })?;
    Ok(Json(IngestResponse {
        status: "success",
        documents_ingested: report.documents_ingested,
        chunks_created: report.chunks_created,
        failures: report.failures,
    }))
}

// ============ GET /admin/stats ============

#[derive(Debug, Serialize)]
struct StatsResponse {
    total_documents: usize,
    collection_name: String,
    embedding_model: String,
    source_count: usize,
    last_ingested_at: Option<String>,
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let stats = state.engine.stats().await?;
    let embedding = &state.config.embedding;
    Ok(Json(StatsResponse {
        total_documents: stats.entry_count,
        collection_name: stats.collection,
        embedding_model: embedding
            .model
            .clone()
            .unwrap_or_else(|| embedding.provider.clone()),
        source_count: stats.source_count,
        last_ingested_at: stats.last_ingested_at,
    }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
