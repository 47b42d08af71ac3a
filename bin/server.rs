// PPI Toolkit - Web Server
// Read-only JSON API over the series store

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use clap::Parser;
use ppi_toolkit::{
    category_search, compare_series, compute_changes, default_range, fuzzy_search, get_group_stats,
    get_latest_data_date, latest_changes, price_levels, ChangeRecord, GroupStat, LevelPoint,
    Observation, PpiError, RebasedSeries, SearchHit, SeriesMetadata, SeriesProvider, SqliteStore,
    YearMonth, DEFAULT_SEARCH_LIMIT, DEFAULT_WINDOWS,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ppi-server")]
#[command(about = "Read-only HTTP API for PPI series and annualized changes", long_about = None)]
struct Args {
    /// SQLite database file
    #[arg(long, env = "PPI_TOOLKIT_DB", default_value = "ppi_toolkit.db")]
    db: PathBuf,

    #[arg(long, default_value = "0.0.0.0:3000")]
    addr: String,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<SqliteStore>>,
}

impl AppState {
    fn store(&self) -> Result<MutexGuard<'_, SqliteStore>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::internal("database lock poisoned"))
    }
}

/// API Response wrapper
#[derive(Debug, Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error mapped onto an HTTP status: unknown series 404, caller errors 400, the rest 500
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.to_string(),
        }
    }
}

impl From<PpiError> for ApiError {
    fn from(err: PpiError) -> Self {
        let status = match &err {
            PpiError::SeriesNotFound(_) => StatusCode::NOT_FOUND,
            e if e.is_caller_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %err, "request failed");
        } else {
            warn!(error = %err, "rejected request");
        }

        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// ============================================================================
// Request / response shapes
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct SearchParams {
    q: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ChangesParams {
    /// YYYY-MM
    start: Option<String>,
    /// YYYY-MM
    end: Option<String>,
    /// Comma separated months, e.g. "1,3,6,12"
    windows: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RangeParams {
    start: Option<String>,
    end: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CompareParams {
    /// Comma separated series ids
    ids: Option<String>,
    start: Option<String>,
    end: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LatestParams {
    as_of: Option<String>,
    windows: Option<String>,
}

#[derive(Serialize)]
struct SeriesResponse {
    metadata: SeriesMetadata,
    observation_count: usize,
    first: Option<YearMonth>,
    last: Option<YearMonth>,
    observations: Vec<Observation>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    latest_data: Option<YearMonth>,
}

fn parse_month(value: Option<&str>) -> Result<Option<YearMonth>, PpiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.parse::<YearMonth>())
        .transpose()
}

fn parse_window_list(value: Option<&str>) -> Result<Vec<u32>, PpiError> {
    match value {
        None => Ok(DEFAULT_WINDOWS.to_vec()),
        Some(list) => list
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<u32>()
                    .map_err(|_| PpiError::InvalidWindow(format!("'{}' is not a month count", part.trim())))
            })
            .collect(),
    }
}

fn parse_id_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

fn decode_id(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|id| id.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health
async fn health_check(State(state): State<AppState>) -> ApiResult<HealthResponse> {
    let store = state.store()?;
    let latest_data = get_latest_data_date(store.connection())?;

    Ok(Json(ApiResponse::ok(HealthResponse {
        status: "OK",
        version: ppi_toolkit::VERSION,
        latest_data,
    })))
}

/// GET /api/search?q=&limit=
async fn search_series(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Vec<SearchHit>> {
    let query = params.q.unwrap_or_default();
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);

    let store = state.store()?;
    let hits = fuzzy_search(store.connection(), &query, limit)?;

    Ok(Json(ApiResponse::ok(hits)))
}

/// GET /api/categories
async fn list_categories(State(state): State<AppState>) -> ApiResult<Vec<GroupStat>> {
    let store = state.store()?;
    Ok(Json(ApiResponse::ok(get_group_stats(store.connection())?)))
}

/// GET /api/categories/:group
async fn category_series(
    State(state): State<AppState>,
    Path(group): Path<String>,
) -> ApiResult<Vec<SeriesMetadata>> {
    let store = state.store()?;
    Ok(Json(ApiResponse::ok(category_search(store.connection(), &decode_id(&group))?)))
}

/// GET /api/series/:id
async fn get_series(
    State(state): State<AppState>,
    Path(series_id): Path<String>,
) -> ApiResult<SeriesResponse> {
    let series_id = decode_id(&series_id);
    let store = state.store()?;

    let metadata = store.get_series_metadata(&series_id)?;
    let observations = store.get_series_data(&series_id)?;

    Ok(Json(ApiResponse::ok(SeriesResponse {
        metadata,
        observation_count: observations.len(),
        first: observations.first().map(|o| o.year_month()),
        last: observations.last().map(|o| o.year_month()),
        observations,
    })))
}

/// GET /api/series/:id/changes?start=YYYY-MM&end=YYYY-MM&windows=1,3,6,12
async fn series_changes(
    State(state): State<AppState>,
    Path(series_id): Path<String>,
    Query(params): Query<ChangesParams>,
) -> ApiResult<Vec<ChangeRecord>> {
    let series_id = decode_id(&series_id);
    let start = parse_month(params.start.as_deref())?;
    let end = parse_month(params.end.as_deref())?;
    let windows = parse_window_list(params.windows.as_deref())?;

    let store = state.store()?;
    let series = store.get_series_data(&series_id)?;

    let records = match default_range(&series, start, end)? {
        Some((start, end)) => compute_changes(
            &*store,
            &series_id,
            start.year,
            start.month,
            end.year,
            end.month,
            &windows,
        )?,
        None => Vec::new(),
    };

    Ok(Json(ApiResponse::ok(records)))
}

/// GET /api/series/:id/levels?start=YYYY-MM&end=YYYY-MM
async fn series_levels(
    State(state): State<AppState>,
    Path(series_id): Path<String>,
    Query(params): Query<RangeParams>,
) -> ApiResult<Vec<LevelPoint>> {
    let series_id = decode_id(&series_id);
    let start = parse_month(params.start.as_deref())?;
    let end = parse_month(params.end.as_deref())?;

    let store = state.store()?;
    let series = store.get_series_data(&series_id)?;

    Ok(Json(ApiResponse::ok(price_levels(&series, start, end)?)))
}

/// GET /api/compare?ids=A,B&start=YYYY-MM&end=YYYY-MM
async fn compare(
    State(state): State<AppState>,
    Query(params): Query<CompareParams>,
) -> ApiResult<Vec<RebasedSeries>> {
    let ids = parse_id_list(params.ids.as_deref());
    let start = parse_month(params.start.as_deref())?;
    let end = parse_month(params.end.as_deref())?;

    let store = state.store()?;
    Ok(Json(ApiResponse::ok(compare_series(&*store, &ids, start, end)?)))
}

/// GET /api/series/:id/latest?as_of=YYYY-MM
async fn series_latest(
    State(state): State<AppState>,
    Path(series_id): Path<String>,
    Query(params): Query<LatestParams>,
) -> ApiResult<Option<ChangeRecord>> {
    let series_id = decode_id(&series_id);
    let as_of = parse_month(params.as_of.as_deref())?;
    let windows = parse_window_list(params.windows.as_deref())?;

    let store = state.store()?;
    let latest = latest_changes(&*store, &series_id, as_of, &windows)?;

    Ok(Json(ApiResponse::ok(latest)))
}

fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/search", get(search_series))
        .route("/categories", get(list_categories))
        .route("/categories/:group", get(category_series))
        .route("/series/:id", get(get_series))
        .route("/series/:id/changes", get(series_changes))
        .route("/series/:id/latest", get(series_latest))
        .route("/series/:id/levels", get(series_levels))
        .route("/compare", get(compare))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ppi_server=info,ppi_toolkit=info")),
        )
        .init();

    let args = Args::parse();

    println!("🌐 PPI Toolkit - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if !args.db.exists() {
        eprintln!("❌ Database not found at {:?}", args.db);
        eprintln!("   Run: ppi-toolkit --db {} import", args.db.display());
        eprintln!("   to import PPI data first.");
        std::process::exit(1);
    }

    let store = SqliteStore::open(&args.db)?;
    println!("✓ Database opened: {:?}", args.db);

    let state = AppState {
        db: Arc::new(Mutex::new(store)),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&args.addr).await?;
    info!(addr = %args.addr, "listening");

    println!("\n🚀 Server running on http://{}", args.addr);
    println!("   API: http://{}/api/search?q=fruit", args.addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await?;

    Ok(())
}
