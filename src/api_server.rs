/// MarketBoard HTTP API Server
/// Read endpoints over the latest snapshots plus freshness for the dashboard widget
use crate::clock::Clock;
use crate::error::StoreError;
use crate::freshness::{classify, Freshness};
use crate::ingest::RunTick;
use crate::snapshot::QuoteSnapshot;
use crate::store::SnapshotStore;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

pub struct AppState {
    pub store: Arc<dyn SnapshotStore>,
    pub clock: Arc<dyn Clock>,
    pub query_limit: usize,
    /// Present when this process also runs the scheduler
    pub last_run: Option<Arc<RwLock<Option<RunTick>>>>,
}

// ── Errors ──

pub enum ApiError {
    Store { op: &'static str, source: StoreError },
    NotFound,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Store { op, source } => {
                // Details stay in the log
                error!(op, error = %source, "store query failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": "Database error" })),
                )
                    .into_response()
            }
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": "Not found" })),
            )
                .into_response(),
        }
    }
}

fn store_err(op: &'static str) -> impl FnOnce(StoreError) -> ApiError {
    move |source| ApiError::Store { op, source }
}

// ── Data types ──

#[derive(Debug, Deserialize)]
pub struct PreferredBody {
    pub preferred: bool,
}

#[derive(Debug, Serialize)]
pub struct SymbolFreshness {
    pub symbol: String,
    pub observed_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(flatten)]
    pub freshness: Freshness,
}

// ── API Handlers ──

/// GET /api/assets - newest snapshots first
async fn get_assets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<QuoteSnapshot>>, ApiError> {
    let rows = state
        .store
        .latest(state.query_limit)
        .await
        .map_err(store_err("latest"))?;
    Ok(Json(rows))
}

/// GET /api/assets/:symbol
async fn get_asset(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Result<Json<QuoteSnapshot>, ApiError> {
    state
        .store
        .get(&symbol.to_uppercase())
        .await
        .map_err(store_err("get"))?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// PUT /api/assets/:symbol/preferred - the only writer of the curated flag
async fn put_preferred(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Json(body): Json<PreferredBody>,
) -> Result<Json<QuoteSnapshot>, ApiError> {
    let symbol = symbol.to_uppercase();
    let found = state
        .store
        .set_preferred(&symbol, body.preferred)
        .await
        .map_err(store_err("set_preferred"))?;
    if !found {
        return Err(ApiError::NotFound);
    }
    info!(symbol = %symbol, preferred = body.preferred, "preferred flag updated");
    state
        .store
        .get(&symbol)
        .await
        .map_err(store_err("get"))?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// GET /api/freshness - age of the newest row in the table
async fn get_freshness(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Freshness>, ApiError> {
    let newest = state.store.latest(1).await.map_err(store_err("latest"))?;
    let last = newest.first().map(|s| s.observed_at);
    Ok(Json(classify(last, state.clock.now())))
}

/// GET /api/freshness/:symbol
async fn get_symbol_freshness(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Result<Json<SymbolFreshness>, ApiError> {
    let symbol = symbol.to_uppercase();
    let row = state.store.get(&symbol).await.map_err(store_err("get"))?;
    let observed_at = row.map(|s| s.observed_at);
    Ok(Json(SymbolFreshness {
        symbol,
        observed_at,
        freshness: classify(observed_at, state.clock.now()),
    }))
}

/// GET /api/status
async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let rows = state.store.count().await.map_err(store_err("count"))?;
    let last_run = match &state.last_run {
        Some(lr) => lr.read().await.clone(),
        None => None,
    };
    Ok(Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "rows": rows,
        "ingesting": state.last_run.is_some(),
        "last_run": last_run,
        "timestamp": state.clock.now().timestamp()
    })))
}

// ── Server ──

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/assets", get(get_assets))
        .route("/api/assets/:symbol", get(get_asset))
        .route("/api/assets/:symbol/preferred", put(put_preferred))
        .route("/api/freshness", get(get_freshness))
        .route("/api/freshness/:symbol", get(get_symbol_freshness))
        .route("/api/status", get(get_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_api_server(
    state: Arc<AppState>,
    addr: SocketAddr,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(state);

    info!(%addr, "starting HTTP server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
