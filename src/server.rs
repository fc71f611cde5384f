//! HTTP query surface.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/chapters` | All chapters in order |
//! | `GET`  | `/chapters/{n}` | Verses of chapter `n` (1..=114) |
//! | `GET`  | `/search?q=&limit=` | Full-text search; blank `q` lists verses in order |
//! | `GET`  | `/stats` | Row counts, consistency report, last ingestion run |
//! | `GET`  | `/health` | Liveness (returns version) |
//!
//! Every route sits behind the per-client rate limiter.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "chapter must be between 1 and 114, got 0" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `rate_limited` (429,
//! with `Retry-After`), `internal` (500). Storage failures are logged and
//! reported as a generic `internal` error.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::QueryError;
use crate::models::{ChapterMeta, ConsistencyReport, Hit, IngestRun, StoreCounts, Verse};
use crate::query::{parse_chapter, QueryService};
use crate::ratelimit::{rate_limit_middleware, spawn_sweep_task, RateLimiter};
use crate::store::Store;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub query: QueryService,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Store, config: Config) -> Self {
        Self {
            query: QueryService::new(store, config.retrieval.clone()),
            config: Arc::new(config),
        }
    }
}

/// Assemble the router with all layers. The caller provides the limiter so
/// tests can share one with assertions.
pub fn build_router(state: AppState, limiter: RateLimiter) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .route("/health", get(handle_health))
        .route("/chapters", get(handle_list_chapters))
        .route("/chapters/{number}", get(handle_get_chapter))
        .route("/search", get(handle_search))
        .route("/stats", get(handle_stats))
        .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
pub async fn run_server(config: &Config, shutdown: CancellationToken) -> anyhow::Result<()> {
    let store = Store::open(config).await?;

    let limiter = RateLimiter::new(&config.rate_limit);
    let sweeper = limiter.is_enabled().then(|| {
        spawn_sweep_task(
            limiter.clone(),
            Duration::from_secs(config.rate_limit.sweep_interval_secs),
        )
    });

    let state = AppState::new(store.clone(), config.clone());
    let app = build_router(state, limiter);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        rate_per_min = config.rate_limit.requests_per_minute,
        rate_limit = config.rate_limit.enabled,
        "server listening"
    );
    println!("Listening on http://{}", config.server.bind);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    store.close().await;
    tracing::info!("server stopped");
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

/// Client-visible error. Only the four codes below ever leave the server.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    retry_after: Option<Duration>,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn rate_limited(retry_after: Duration) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            code: "rate_limited",
            message: "too many requests".to_string(),
            retry_after: Some(retry_after),
        }
    }

    pub fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: "internal error".to_string(),
            retry_after: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::InvalidArgument(msg) => Self::bad_request(msg),
            QueryError::NotFound(msg) => Self::not_found(msg),
            QueryError::Storage(e) => {
                tracing::error!(error = %e, "query failed");
                Self::internal()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let retry_after = self.retry_after;
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(wait) = retry_after {
            // Whole seconds, rounded up, never zero.
            let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        response
    }
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

// ============ GET /chapters ============

#[derive(Serialize)]
struct ChaptersResponse {
    chapters: Vec<ChapterMeta>,
}

async fn handle_list_chapters(
    State(state): State<AppState>,
) -> Result<Json<ChaptersResponse>, AppError> {
    let chapters = state.query.list_chapters().await?;
    Ok(Json(ChaptersResponse { chapters }))
}

// ============ GET /chapters/{number} ============

#[derive(Serialize)]
struct ChapterResponse {
    chapter: u32,
    verses: Vec<Verse>,
}

async fn handle_get_chapter(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<ChapterResponse>, AppError> {
    let number = parse_chapter(&raw)?;
    let verses = state.query.get_chapter(number).await?;
    Ok(Json(ChapterResponse {
        chapter: number,
        verses,
    }))
}

// ============ GET /search ============

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    limit: Option<String>,
}

#[derive(Serialize)]
struct SearchResponse {
    q: String,
    limit: u32,
    hits: Vec<Hit>,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    state.query.check_query_len(&params.q)?;

    let limit = match params.limit.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<u32>()
                .map_err(|_| AppError::bad_request(format!("invalid limit: '{}'", raw)))?,
        ),
    };

    let hits = state.query.search(&params.q, limit).await?;
    Ok(Json(SearchResponse {
        limit: state.query.effective_limit(limit),
        q: params.q,
        hits,
    }))
}

// ============ GET /stats ============

#[derive(Serialize)]
struct StatsResponse {
    counts: StoreCounts,
    consistent: bool,
    complete: bool,
    consistency: ConsistencyReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_ingest: Option<IngestRun>,
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let store = state.query.store();
    let counts = store.counts().await.map_err(QueryError::from)?;
    let consistency = store.consistency_report().await.map_err(QueryError::from)?;
    let last_ingest = store.last_ingest_run().await.map_err(QueryError::from)?;

    Ok(Json(StatsResponse {
        counts,
        consistent: consistency.is_consistent(),
        complete: consistency.is_complete(),
        consistency,
        last_ingest,
    }))
}
