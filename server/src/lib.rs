use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::{HeaderValue, StatusCode}, routing::get, Json, Router};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sift_core::{IndexStore, Page, PageId, QueryEngine, StopStem, StoreError};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Per-hit enrichment limits.
const HIT_KEYWORDS: usize = 5;
const HIT_LINKS: usize = 5;
const MAX_K: usize = 100;

type ApiError = (StatusCode, String);

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_ms: u128,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub score: f64,
    #[serde(flatten)]
    pub page: PageDetail,
}

#[derive(Serialize)]
pub struct Keyword {
    pub word: String,
    pub frequency: u32,
}

#[derive(Serialize)]
pub struct PageDetail {
    pub page_id: PageId,
    pub url: String,
    pub title: String,
    pub last_modified: i64,
    pub size: u64,
    pub keywords: Vec<Keyword>,
    pub children: Vec<String>,
    pub parents: Vec<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub store: IndexStore,
    /// One engine shared by all requests; its caches are not synchronized.
    pub engine: Arc<Mutex<QueryEngine<StopStem>>>,
}

pub fn build_app(index_dir: String) -> Result<Router> {
    let store = IndexStore::open(&index_dir)?;
    let pages = store.page_count()?;
    info!(index = %index_dir, pages, "index opened");
    Ok(build_app_with_store(store, StopStem::new()))
}

pub fn build_app_with_store(store: IndexStore, normalizer: StopStem) -> Router {
    let engine = QueryEngine::new(store.clone(), normalizer);
    let app_state = AppState { store, engine: Arc::new(Mutex::new(engine)) };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/page/:page_id", get(page_handler))
        .with_state(app_state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// CORS_ALLOW_ORIGIN is a comma-separated origin list; any origin when unset or unparsable.
fn cors_layer() -> CorsLayer {
    let origins: Vec<HeaderValue> = std::env::var("CORS_ALLOW_ORIGIN")
        .map(|val| val.split(',').filter_map(|s| s.trim().parse().ok()).collect())
        .unwrap_or_default();
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

fn internal(e: StoreError) -> ApiError {
    error!(error = %e, "index error");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn urls(store: &IndexStore, ids: &[PageId]) -> Result<Vec<String>, StoreError> {
    let mut out = Vec::with_capacity(ids.len().min(HIT_LINKS));
    for id in ids.iter().take(HIT_LINKS) {
        if let Some(page) = store.page(*id)? {
            out.push(page.url);
        }
    }
    Ok(out)
}

fn page_detail(store: &IndexStore, page: Page) -> Result<PageDetail, StoreError> {
    let keywords = store
        .top_keywords(page.page_id, HIT_KEYWORDS)?
        .into_iter()
        .map(|(word, frequency)| Keyword { word, frequency })
        .collect();
    let children = urls(store, &page.child_ids)?;
    let parents = urls(store, &store.parent_ids(page.page_id)?)?;
    Ok(PageDetail {
        page_id: page.page_id,
        url: page.url,
        title: page.title,
        last_modified: page.last_modified,
        size: page.size,
        keywords,
        children,
        parents,
    })
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let ranked = state.engine.lock().search(&params.q).map_err(internal)?;
    let total_hits = ranked.len();
    let k = params.k.clamp(1, MAX_K);

    let mut results = Vec::with_capacity(k.min(total_hits));
    for hit in ranked.into_iter().take(k) {
        let Some(page) = state.store.page(hit.page_id).map_err(internal)? else { continue };
        let page = page_detail(&state.store, page).map_err(internal)?;
        results.push(SearchHit { score: hit.score, page });
    }

    Ok(Json(SearchResponse { query: params.q, took_ms: start.elapsed().as_millis(), total_hits, results }))
}

pub async fn page_handler(
    State(state): State<AppState>,
    Path(page_id): Path<PageId>,
) -> Result<Json<PageDetail>, ApiError> {
    match state.store.page(page_id).map_err(internal)? {
        Some(page) => Ok(Json(page_detail(&state.store, page).map_err(internal)?)),
        None => Err((StatusCode::NOT_FOUND, format!("page {page_id} not found"))),
    }
}
