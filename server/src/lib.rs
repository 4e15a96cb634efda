use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::{HeaderMap, StatusCode}, routing::{get, post}, Json, Router};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use stackrank_core::{
    Bm25Ranker, DocId, IndexReport, IndexStore, Indexer, QueryProcessor, QuestionRecord, RankedResult, RankerConfig,
    SledStore,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

type ApiError = (StatusCode, String);

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    pub tag: Option<String>,
}
fn default_min_score() -> f64 { 20.0 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_results: usize,
    pub results: Vec<RankedResult>,
}

#[derive(Deserialize)]
pub struct SuggestParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Clone)]
pub struct AppState {
    pub store: SledStore,
    /// The ranker owns its caches; one lock serializes searches and invalidation.
    pub ranker: Arc<Mutex<Bm25Ranker<SledStore>>>,
    pub admin_token: Option<String>,
}

pub fn build_app(db_path: String, config: RankerConfig) -> Result<Router> {
    let store = SledStore::open(&db_path)?;
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    Ok(router(store, config, admin_token))
}

pub fn router(store: SledStore, config: RankerConfig, admin_token: Option<String>) -> Router {
    let ranker = Arc::new(Mutex::new(Bm25Ranker::new(store.clone(), config)));
    let app_state = AppState { store, ranker, admin_token };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/search", get(search_handler))
        .route("/suggest", get(suggest_handler))
        .route("/stats", get(stats_handler))
        .route("/question/:question_id", get(question_handler))
        .route("/index/batch", post(index_batch))
        .route("/index/rebuild", post(index_rebuild))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn internal(err: anyhow::Error) -> ApiError {
    tracing::error!(error = %format!("{err:#}"), "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
}

async fn health_handler(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let questions = state.store.question_count().map_err(internal)?;
    Ok(Json(serde_json::json!({ "status": "healthy", "questions_indexed": questions })))
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, ApiError> {
    if params.q.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "query is required".into()));
    }
    let start = std::time::Instant::now();
    let results = state
        .ranker
        .lock()
        .search_and_rank(&params.q, params.min_score, params.tag.as_deref())
        .map_err(internal)?;
    let elapsed = start.elapsed();
    tracing::info!(query = %params.q, hits = results.len(), took_ms = elapsed.as_millis() as u64, "search");
    Ok(Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), total_results: results.len(), results }))
}

async fn suggest_handler(State(state): State<AppState>, Query(params): Query<SuggestParams>) -> Result<Json<serde_json::Value>, ApiError> {
    let qp = QueryProcessor::new(state.store.clone());
    let parsed = qp.process_query(&params.q);
    let suggestions = qp.suggest_terms(&params.q).map_err(internal)?;
    Ok(Json(serde_json::json!({ "query": parsed, "suggestions": suggestions })))
}

async fn stats_handler(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let stats = state.ranker.lock().corpus_stats().map_err(internal)?;
    let questions = state.store.question_count().map_err(internal)?;
    let meta = state.store.load_meta().map_err(internal)?;
    Ok(Json(serde_json::json!({
        "total_questions": questions,
        "total_documents": stats.total_docs,
        "avg_document_length": stats.avg_doc_length,
        "indexed_at": meta.map(|m| m.indexed_at),
    })))
}

async fn question_handler(State(state): State<AppState>, Path(question_id): Path<DocId>) -> Result<Json<serde_json::Value>, ApiError> {
    let question = state.store.get_question(question_id).map_err(internal)?;
    let Some(question) = question else {
        return Err((StatusCode::NOT_FOUND, format!("question {question_id} not found")));
    };
    let answers = state.store.get_answers(question_id).map_err(internal)?;
    Ok(Json(serde_json::json!({ "question": question, "answers": answers })))
}

// --- Admin endpoints ---
// Indexing is blocking sled work and runs off the async workers.
async fn index_batch(State(state): State<AppState>, headers: HeaderMap, Json(records): Json<Vec<QuestionRecord>>) -> Result<Json<IndexReport>, ApiError> {
    authorize(&state, &headers)?;
    let store = state.store.clone();
    let report = tokio::task::spawn_blocking(move || Indexer::new(store).index_batch(records))
        .await
        .map_err(|err| internal(err.into()))?;
    state.ranker.lock().clear_cache();
    Ok(Json(report))
}

async fn index_rebuild(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<IndexReport>, ApiError> {
    authorize(&state, &headers)?;
    let store = state.store.clone();
    let report = tokio::task::spawn_blocking(move || Indexer::new(store).reindex_all())
        .await
        .map_err(|err| internal(err.into()))?
        .map_err(internal)?;
    state.ranker.lock().clear_cache();
    Ok(Json(report))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
