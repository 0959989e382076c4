use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use jobdex_core::persist::IndexPaths;
use jobdex_core::{Document, DocumentSummary, EngineConfig, RetrievalModel, SearchEngine};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod error;
pub mod snippet;

pub use error::ApiError;

pub struct AppConfig {
    /// Index directory loaded at startup and written by `/api/index/commit`.
    pub index_dir: PathBuf,
    /// Required in `X-ADMIN-TOKEN` for mutating endpoints; unset disables them.
    pub admin_token: Option<String>,
    /// Comma-separated allowed origins; any origin when unset.
    pub cors_allow_origin: Option<String>,
    pub engine: EngineConfig,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
    pub index_dir: PathBuf,
    pub admin_token: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_k")]
    pub num_results: i64,
    pub model: Option<String>,
    #[serde(default)]
    pub use_expansion: bool,
}
fn default_k() -> i64 { 10 }

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: i64,
    pub model: Option<String>,
    #[serde(default)]
    pub expansion: bool,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub model: RetrievalModel,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHitView>,
}

#[derive(Serialize)]
pub struct SearchHitView {
    pub doc_id: String,
    pub score: f64,
    pub title: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub salary_range: Option<String>,
    pub snippet: Option<String>,
}

#[derive(Deserialize)]
pub struct SuggestParams {
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_suggestions")]
    pub limit: usize,
}
fn default_suggestions() -> usize { 5 }

/// Upper bound on `limit` for `/api/suggest`.
pub const MAX_SUGGESTIONS: usize = 50;

#[derive(Serialize, Deserialize)]
pub struct SuggestResponse {
    pub results: Vec<String>,
}

#[derive(Deserialize)]
pub struct AddDocumentRequest {
    #[serde(alias = "docno")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "text")]
    pub body: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub replace: bool,
}

#[derive(Deserialize)]
pub struct ModelConfig {
    pub model: String,
}

/// Open the index directory (or start empty when none exists yet) and build the router.
pub fn build_app(config: AppConfig) -> Result<Router> {
    let engine = if IndexPaths::new(&config.index_dir).exists() {
        SearchEngine::open(&config.index_dir, config.engine)?
    } else {
        tracing::warn!(index = %config.index_dir.display(), "no index found, starting empty");
        SearchEngine::new(config.engine)
    };
    let stats = engine.stats();
    tracing::info!(documents = stats.documents, unique_terms = stats.unique_terms, model = %stats.default_model, "index loaded");

    let state = AppState { engine: Arc::new(engine), index_dir: config.index_dir, admin_token: config.admin_token };
    Ok(router(state, config.cors_allow_origin.as_deref()))
}

pub fn router(state: AppState, cors_allow_origin: Option<&str>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_get))
        .route("/api/search", post(search_post))
        .route("/api/suggest", get(suggest_handler))
        .route("/api/documents", get(list_documents).post(add_document))
        .route("/api/documents/:id", get(get_document).delete(remove_document))
        .route("/api/index/commit", post(index_commit))
        .route("/api/set_model", post(set_model))
        .route("/api/info", get(info))
        .with_state(state)
        .layer(cors_layer(cors_allow_origin))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(allow_origin: Option<&str>) -> CorsLayer {
    let origins: Vec<_> = allow_origin
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    if origins.is_empty() {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
    }
}

fn run_search(state: &AppState, req: SearchRequest) -> Result<SearchResponse, ApiError> {
    let start = std::time::Instant::now();
    let mut query = jobdex_core::Query::new(req.query.clone()).limit(req.num_results).expansion(req.use_expansion);
    if let Some(name) = &req.model {
        query = query.model(name.parse()?);
    }
    let found = state.engine.search(&query)?;

    // Capture raw query terms for highlighting
    let raw_terms = snippet::raw_terms(&req.query);
    let snap = state.engine.snapshot();
    let results = found
        .hits
        .into_iter()
        .map(|hit| {
            let snippet = snap.index.get(&hit.id).and_then(|doc| snippet::snippet(&doc.body, &raw_terms));
            let DocumentSummary { title, company, location, salary_range, .. } = hit.metadata;
            SearchHitView { doc_id: hit.id, score: hit.score, title, company, location, salary_range, snippet }
        })
        .collect();

    Ok(SearchResponse { query: req.query, model: found.model, took_s: start.elapsed().as_secs_f64(), total_hits: found.total_hits, results })
}

pub async fn search_post(State(state): State<AppState>, Json(req): Json<SearchRequest>) -> Result<Json<SearchResponse>, ApiError> {
    run_search(&state, req).map(Json)
}

pub async fn search_get(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, ApiError> {
    let req = SearchRequest { query: params.q, num_results: params.k, model: params.model, use_expansion: params.expansion };
    run_search(&state, req).map(Json)
}

pub async fn suggest_handler(State(state): State<AppState>, Query(params): Query<SuggestParams>) -> Json<SuggestResponse> {
    Json(SuggestResponse { results: state.engine.suggest(&params.query, params.limit.min(MAX_SUGGESTIONS)) })
}

pub async fn list_documents(State(state): State<AppState>) -> Json<Vec<DocumentSummary>> {
    Json(state.engine.list_documents())
}

pub async fn get_document(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Document>, ApiError> {
    Ok(Json(state.engine.get_document(&id)?))
}

async fn add_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AddDocumentRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    authorize(&state, &headers)?;
    let doc = Document { id: req.id, title: req.title, body: req.body, attributes: req.attributes };
    let id = doc.id.clone();
    state.engine.add_document(doc, req.replace)?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "status": "success", "id": id }))))
}

async fn remove_document(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    state.engine.remove_document(&id)?;
    Ok(Json(serde_json::json!({ "status": "success", "id": id })))
}

async fn index_commit(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    let (engine, dir) = (Arc::clone(&state.engine), state.index_dir.clone());
    let meta = tokio::task::spawn_blocking(move || engine.save(dir))
        .await
        .map_err(|err| ApiError(StatusCode::INTERNAL_SERVER_ERROR, format!("commit task failed: {err}")))??;
    Ok(Json(serde_json::json!({ "status": "success", "meta": meta })))
}

async fn set_model(State(state): State<AppState>, Json(config): Json<ModelConfig>) -> Result<Json<serde_json::Value>, ApiError> {
    let model: RetrievalModel = config.model.parse()?;
    state.engine.set_default_model(model);
    Ok(Json(serde_json::json!({ "status": "success", "message": format!("Model changed to {model}") })))
}

async fn info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.engine.stats();
    Json(serde_json::json!({
        "status": "ready",
        "documents": stats.documents,
        "tokens": stats.tokens,
        "unique_terms": stats.unique_terms,
        "suggestions": stats.suggestions,
        "version": stats.version,
        "model": stats.default_model,
        "available_models": stats.available_models,
    }))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err(ApiError::unauthorized("ADMIN_TOKEN not set")),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err(ApiError::unauthorized("invalid admin token"))
    }
}
