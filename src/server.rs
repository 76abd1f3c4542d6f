//! HTTP server for the retrieval path.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/embeddings/query` | Top-K similar chunks for a question |
//! | `POST` | `/chat/context` | Filtered, source-diverse grounding context |
//! | `GET`  | `/health` | Health check (version, model) |
//!
//! # Error Contract
//!
//! Every response body is JSON: `{ "results": [...] }` (plus a `metadata`
//! summary for chat context) or `{ "error": "<message>" }`. Validation failures are `400` and are
//! reported before the embedding model is touched; every other failure is
//! `500` and carries only the message.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the dashboard
//! frontend can call the server from its own origin.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::{Config, RetrievalConfig};
use crate::db;
use crate::embedding::{create_generator, Embedder};
use crate::error::RetrievalError;
use crate::grounding::{select_context, summarize, ContextSummary};
use crate::models::SimilarityResult;
use crate::search;
use crate::store::ChunkStore;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub retrieval: Arc<RetrievalConfig>,
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn ChunkStore>,
}

/// Starts the HTTP server with the configured model and SQLite store.
///
/// Binds to `[server].bind` and runs until Ctrl-C. The model is not loaded
/// here; the first request that needs an embedding loads it.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = db::open_store(config).await?;
    let generator = create_generator(&config.embedding)?;
    run_server_with(config, Arc::new(generator), Arc::new(store)).await
}

/// Starts the server with caller-provided embedder and store.
pub async fn run_server_with(
    config: &Config,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn ChunkStore>,
) -> anyhow::Result<()> {
    let state = AppState {
        retrieval: Arc::new(config.retrieval.clone()),
        embedder,
        store,
    };

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(
        addr = %listener.local_addr()?,
        model = state.embedder.model_name(),
        "retrieval server listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Build the router. Exposed so callers can mount it or serve it themselves.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/embeddings/query", post(handle_query))
        .route("/chat/context", post(handle_chat_context))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Error that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
}

impl From<RetrievalError> for AppError {
    fn from(err: RetrievalError) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(status = self.status.as_u16(), error = %self.message, "request failed");
        }
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Parse a JSON body, turning malformed input into a validation error
/// instead of Axum's plain-text rejection.
fn parse_body<T: for<'de> Deserialize<'de>>(body: &Bytes) -> Result<T, RetrievalError> {
    serde_json::from_slice(body)
        .map_err(|e| RetrievalError::validation(format!("Invalid JSON body: {}", e)))
}

fn require_project_and_text(
    project_id: Option<i64>,
    text: Option<String>,
    missing_message: &str,
) -> Result<(i64, String), RetrievalError> {
    match (project_id, text) {
        (Some(id), Some(text)) if id > 0 && !text.trim().is_empty() => Ok((id, text)),
        _ => Err(RetrievalError::validation(missing_message)),
    }
}

// ============ POST /embeddings/query ============

/// Request body for `POST /embeddings/query`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub project_id: Option<i64>,
    pub question: Option<String>,
    pub top_k: Option<i64>,
}

/// A request that passed validation.
#[derive(Debug, PartialEq)]
pub struct ValidatedQuery {
    pub project_id: i64,
    pub question: String,
    pub top_k: usize,
}

impl QueryRequest {
    /// Check required fields and resolve `topK` (default, then clamp to
    /// `max_top_k`).
    pub fn validate(self, config: &RetrievalConfig) -> Result<ValidatedQuery, RetrievalError> {
        let top_k = match self.top_k {
            None => config.default_top_k,
            Some(k) if k > 0 => (k as usize).min(config.max_top_k),
            Some(_) => return Err(RetrievalError::validation("topK must be a positive integer")),
        };
        let (project_id, question) = require_project_and_text(
            self.project_id,
            self.question,
            "Missing projectId or question",
        )?;
        Ok(ValidatedQuery {
            project_id,
            question,
            top_k,
        })
    }
}

/// Response body for `POST /embeddings/query`.
#[derive(Serialize)]
struct ResultsResponse {
    results: Vec<SimilarityResult>,
}

/// Handler for `POST /embeddings/query`.
async fn handle_query(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ResultsResponse>, AppError> {
    let req: QueryRequest = parse_body(&body)?;
    let query = req.validate(&state.retrieval)?;

    let results = search::retrieve(
        state.embedder.as_ref(),
        state.store.as_ref(),
        query.project_id,
        &query.question,
        query.top_k,
    )
    .await?;

    Ok(Json(ResultsResponse { results }))
}

// ============ POST /chat/context ============

/// Request body for `POST /chat/context`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatContextRequest {
    project_id: Option<i64>,
    message: Option<String>,
}

/// Response body for `POST /chat/context`.
#[derive(Serialize)]
struct ChatContextResponse {
    results: Vec<SimilarityResult>,
    metadata: ContextSummary,
}

/// Handler for `POST /chat/context`.
///
/// Retrieves `candidate_k` chunks, then applies quality filtering and
/// source diversity before returning them with a per-source-type summary.
async fn handle_chat_context(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ChatContextResponse>, AppError> {
    let req: ChatContextRequest = parse_body(&body)?;
    let (project_id, message) =
        require_project_and_text(req.project_id, req.message, "Missing projectId or message")?;

    let candidates = search::retrieve(
        state.embedder.as_ref(),
        state.store.as_ref(),
        project_id,
        &message,
        state.retrieval.candidate_k,
    )
    .await?;

    let results = select_context(candidates, &state.retrieval);
    let metadata = summarize(&results);
    Ok(Json(ChatContextResponse { results, metadata }))
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    version: String,
    model: String,
    dims: usize,
    model_loaded: bool,
}

/// Handler for `GET /health`.
async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.embedder.model_name().to_string(),
        dims: state.embedder.dims(),
        model_loaded: state.embedder.is_loaded(),
    })
}
