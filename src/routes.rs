//! HTTP surface: mapping registration and both highlight passes

use crate::cache::ResultCache;
use crate::encoder::TagPair;
use crate::error::FieldFailure;
use crate::highlight::{Document, DocumentHighlight, FieldOptions, Highlighter};
use crate::mapping::TypeMapping;
use crate::query::HighlightQuery;
use crate::reconcile::{Reconciler, SearchHit};
use crate::size::parse_size_budget;
use crate::state::AppState;
use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

// === Request/Response types ===

#[derive(Deserialize)]
struct FragmentsRequest {
    #[serde(default)]
    query: Option<HighlightQuery>,
    #[serde(default)]
    fields: BTreeMap<String, FieldOptions>,
    #[serde(default)]
    documents: Vec<Document>,
}

#[derive(Serialize)]
struct FragmentsResponse {
    took: u64,
    documents: Vec<DocumentHighlight>,
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<String>,
}

#[derive(Deserialize)]
struct HighlightRequest {
    #[serde(default)]
    hits: Vec<SearchHit>,
    #[serde(default)]
    pre_tags: Option<Vec<String>>,
    #[serde(default)]
    post_tags: Option<Vec<String>>,
}

#[derive(Serialize)]
struct HighlightResponse {
    took: u64,
    hits: Vec<SearchHit>,
    failures: Vec<FieldFailure>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    mappings: usize,
}

#[derive(Serialize)]
struct AckResponse {
    acknowledged: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

// === Handlers ===

async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, ApiError> {
    let mappings = state
        .mappings
        .read()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?
        .len();
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        mappings,
    }))
}

async fn put_mapping(
    State(state): State<Arc<AppState>>,
    Path((index, doc_type)): Path<(String, String)>,
    Json(mapping): Json<TypeMapping>,
) -> Result<Json<AckResponse>, ApiError> {
    let fields = mapping.properties.len();
    state
        .mappings
        .write()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?
        .put(&index, &doc_type, mapping);
    tracing::info!(%index, %doc_type, fields, "Registered mapping");
    Ok(Json(AckResponse { acknowledged: true }))
}

async fn get_mapping(
    State(state): State<Arc<AppState>>,
    Path((index, doc_type)): Path<(String, String)>,
) -> Result<Json<TypeMapping>, ApiError> {
    let mappings = state
        .mappings
        .read()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;
    mappings
        .get(&index, &doc_type)
        .cloned()
        .map(Json)
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                format!("No mapping for [{index}/{doc_type}]"),
            )
        })
}

async fn fragments(
    State(state): State<Arc<AppState>>,
    Path((index, doc_type)): Path<(String, String)>,
    Json(req): Json<FragmentsRequest>,
) -> Result<Json<FragmentsResponse>, ApiError> {
    let start = Instant::now();
    let mappings = state
        .mappings
        .read()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;
    let mapping = mappings.get(&index, &doc_type).ok_or_else(|| {
        api_error(
            StatusCode::NOT_FOUND,
            format!("No mapping for [{index}/{doc_type}]"),
        )
    })?;

    let query = req.query.unwrap_or(HighlightQuery::MatchAll {});
    let highlighter = Highlighter::new(&state.analyzers, mapping, &query);
    let documents: Vec<DocumentHighlight> = req
        .documents
        .iter()
        .map(|doc| highlighter.highlight_document(doc, &req.fields))
        .collect();

    let took = elapsed_ms(start);
    tracing::info!(%index, %doc_type, documents = documents.len(), took, "Highlighted fragments");
    Ok(Json(FragmentsResponse { took, documents }))
}

fn reconcile(
    state: &AppState,
    index: Option<String>,
    doc_type: Option<String>,
    limit: Option<String>,
    req: HighlightRequest,
) -> Result<Json<HighlightResponse>, ApiError> {
    let start = Instant::now();
    let limit = limit.unwrap_or_else(|| state.config.default_limit.clone());
    let budget =
        parse_size_budget(&limit).map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
    let tags = TagPair::from_options(req.pre_tags.as_deref(), req.post_tags.as_deref());

    let mappings = state
        .mappings
        .read()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;
    let reconciler = Reconciler::new(
        &state.analyzers,
        &mappings,
        &state.system_fields,
        &state.retained_source_fields,
    )
    .with_budget(budget)
    .with_tags(tags);

    let mut cache = ResultCache::new(state.config.result_cache_capacity);
    let mut hits = req.hits;
    let mut failures = Vec::new();
    for hit in &mut hits {
        if hit.index.is_none() {
            hit.index = index.clone();
        }
        if hit.doc_type.is_none() {
            hit.doc_type = doc_type.clone();
        }
        failures.extend(reconciler.reconcile_hit(hit, &mut cache));
    }

    let took = elapsed_ms(start);
    let (cache_hits, cache_misses, _, _) = cache.stats();
    tracing::info!(
        hits = hits.len(),
        failures = failures.len(),
        cache_hits,
        cache_misses,
        took,
        "Reconciled highlights"
    );
    Ok(Json(HighlightResponse {
        took,
        hits,
        failures,
    }))
}

async fn highlight_all(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitQuery>,
    Json(req): Json<HighlightRequest>,
) -> Result<Json<HighlightResponse>, ApiError> {
    reconcile(&state, None, None, params.limit, req)
}

async fn highlight_index(
    State(state): State<Arc<AppState>>,
    Path(index): Path<String>,
    Query(params): Query<LimitQuery>,
    Json(req): Json<HighlightRequest>,
) -> Result<Json<HighlightResponse>, ApiError> {
    reconcile(&state, Some(index), None, params.limit, req)
}

async fn highlight_type(
    State(state): State<Arc<AppState>>,
    Path((index, doc_type)): Path<(String, String)>,
    Query(params): Query<LimitQuery>,
    Json(req): Json<HighlightRequest>,
) -> Result<Json<HighlightResponse>, ApiError> {
    reconcile(&state, Some(index), Some(doc_type), params.limit, req)
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let max_body_bytes = state.config.max_body_bytes;

    Router::new()
        .route("/health", get(health))
        .route("/_highlight", get(highlight_all).post(highlight_all))
        .route("/:index/_highlight", get(highlight_index).post(highlight_index))
        .route(
            "/:index/:doc_type/_highlight",
            get(highlight_type).post(highlight_type),
        )
        .route("/:index/:doc_type/_fragments", post(fragments))
        .route("/:index/:doc_type/_mapping", get(get_mapping).put(put_mapping))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
