//! HTTP API for the semantic store and the policy gate.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::policy::{PolicyDecision, PolicyGate, ToolCall};
use crate::search::{
    Metadata, ScoredDocument, SemanticStore, StoreStats, VectorDocument, DEFAULT_RECENT_LIMIT,
    DEFAULT_SEARCH_K,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SemanticStore>,
    pub gate: Arc<PolicyGate>,
    /// Prometheus render handle; `None` when no recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(store: Arc<SemanticStore>, gate: Arc<PolicyGate>) -> Self {
        Self {
            store,
            gate,
            metrics: None,
            start_time: Instant::now(),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub documents: usize,
    pub uptime: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreDocumentRequest {
    /// Generated when omitted.
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreDocumentResponse {
    pub id: String,
}

/// Document as returned over HTTP; the embedding stays server-side.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct DocumentView {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl From<VectorDocument> for DocumentView {
    fn from(doc: VectorDocument) -> Self {
        Self {
            id: doc.id,
            text: doc.text,
            metadata: doc.metadata,
            timestamp: doc.timestamp,
            score: None,
        }
    }
}

impl From<ScoredDocument> for DocumentView {
    fn from(hit: ScoredDocument) -> Self {
        Self {
            score: Some(hit.score),
            ..Self::from(hit.document)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub k: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FetchCheckRequest {
    pub url: String,
}

type ApiResult<T> = std::result::Result<T, (StatusCode, String)>;

fn to_status(err: Error) -> (StatusCode, String) {
    let status = match &err {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Embedding(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error!(error = %err, "Request failed");
    (status, err.to_string())
}

/// Build the router over `state`.
pub fn router(state: AppState, config: &ApiConfig) -> Router {
    let app = Router::new()
        .route("/health", get(health))
        .route("/documents", post(store_document))
        .route("/documents/recent", get(recent_documents))
        .route(
            "/documents/{id}",
            get(get_document).delete(delete_document),
        )
        .route("/search", get(search))
        .route("/stats", get(stats))
        .route("/policy/fetch", post(check_fetch))
        .route("/policy/tool", post(check_tool))
        .route("/policy/mcp-config", post(check_mcp_config))
        .route("/metrics", get(render_metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.cors_enabled {
        app.layer(cors_layer(&config.cors_origins))
    } else {
        app
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let parsed: Vec<_> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(origin) => Some(origin),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(parsed)
}

/// GET /health
async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let stats = state.store.stats().await.map_err(to_status)?;
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        documents: stats.total_documents,
        uptime: state.start_time.elapsed().as_secs(),
    }))
}

/// POST /documents
async fn store_document(
    State(state): State<AppState>,
    Json(req): Json<StoreDocumentRequest>,
) -> ApiResult<(StatusCode, Json<StoreDocumentResponse>)> {
    if req.text.trim().is_empty() {
        return Err(to_status(Error::Validation(
            "Document text must not be empty".to_string(),
        )));
    }
    let id = req
        .id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    state
        .store
        .store_document(&id, &req.text, req.metadata)
        .await
        .map_err(to_status)?;

    Ok((StatusCode::CREATED, Json(StoreDocumentResponse { id })))
}

/// GET /documents/{id}
async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DocumentView>> {
    match state.store.get_document(&id).await.map_err(to_status)? {
        Some(doc) => Ok(Json(DocumentView::from(doc))),
        None => Err((StatusCode::NOT_FOUND, format!("Document '{}' not found", id))),
    }
}

/// DELETE /documents/{id}
async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let removed = state.store.delete_document(&id).await.map_err(to_status)?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, format!("Document '{}' not found", id)))
    }
}

/// GET /documents/recent?limit=
async fn recent_documents(
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> ApiResult<Json<Vec<DocumentView>>> {
    let docs = state
        .store
        .recent_documents(params.limit.unwrap_or(DEFAULT_RECENT_LIMIT))
        .await
        .map_err(to_status)?;
    Ok(Json(docs.into_iter().map(DocumentView::from).collect()))
}

/// GET /search?q=&k=
///
/// Store failures degrade to an empty result.
async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<DocumentView>> {
    let k = params.k.unwrap_or(DEFAULT_SEARCH_K);
    match state.store.search(&params.q, k).await {
        Ok(hits) => Json(hits.into_iter().map(DocumentView::from).collect()),
        Err(e) => {
            warn!(query = %params.q, error = %e, "[Memory] Search failed, returning no results");
            Json(Vec::new())
        }
    }
}

/// GET /stats
async fn stats(State(state): State<AppState>) -> ApiResult<Json<StoreStats>> {
    state.store.stats().await.map(Json).map_err(to_status)
}

/// POST /policy/fetch
async fn check_fetch(
    State(state): State<AppState>,
    Json(req): Json<FetchCheckRequest>,
) -> Json<PolicyDecision> {
    Json(state.gate.can_fetch(&req.url).await)
}

/// POST /policy/tool
async fn check_tool(
    State(state): State<AppState>,
    Json(call): Json<ToolCall>,
) -> Json<PolicyDecision> {
    Json(state.gate.validate_tool_call(&call))
}

/// POST /policy/mcp-config
///
/// Takes the raw configuration text so malformed JSON reaches the gate.
async fn check_mcp_config(State(state): State<AppState>, body: String) -> Json<PolicyDecision> {
    Json(state.gate.validate_mcp_config(&body).await)
}

/// GET /metrics
async fn render_metrics(State(state): State<AppState>) -> ApiResult<String> {
    state.metrics.as_ref().map(|h| h.render()).ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        "Metrics recorder not installed".to_string(),
    ))
}

/// HTTP server wrapper.
pub struct ApiServer {
    config: ApiConfig,
    state: AppState,
}

impl ApiServer {
    pub fn with_state(config: ApiConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone(), &self.config)
    }

    /// Bind `addr` and serve until the process exits.
    pub async fn run(self, addr: &str) -> Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Api(format!("Failed to bind {}: {}", addr, e)))?;
        info!("API server listening on {}", addr);
        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Api(format!("Server error: {}", e)))
    }
}
