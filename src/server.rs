//! Dashboard HTTP server.
//!
//! Serves the HTML dashboard plus a small JSON API. Refreshes always go
//! through the single-writer refresher; page renders only read the analytics
//! table and the last completed refresh report.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Dashboard: charts and last refresh status |
//! | `POST` | `/` | Dashboard plus similarity search (form field `query`) |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/api/status` | Last completed refresh report |
//! | `POST` | `/api/refresh` | Run a refresh now and return its report |
//! | `GET`  | `/api/comments` | Most commented issues |
//! | `GET`  | `/api/ranking` | Commenters by score |
//! | `POST` | `/api/search` | Similarity search, body `{"query": "..."}` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "unavailable", "message": "analytics service unavailable: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `unavailable` / `rejected` / `malformed`
//! (502, analytics failures), `internal` (500).

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::analytics::{QueryError, QueryResult};
use crate::config::{Config, Secrets};
use crate::models::QueryTable;
use crate::pipeline::{Pipeline, RefreshReport, RefreshTrigger};
use crate::queries;
use crate::refresher::{spawn_refresher, RefreshHandle};
use crate::render::{render_dashboard, ChartView, DashboardView, SearchView};
use crate::scheduler::spawn_periodic;
use crate::search::semantic_search;
use crate::traits::QueryBackend;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    refresher: RefreshHandle,
    analytics: Arc<dyn QueryBackend>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        refresher: RefreshHandle,
        analytics: Arc<dyn QueryBackend>,
    ) -> Self {
        Self {
            config,
            refresher,
            analytics,
        }
    }
}

/// Starts the refresher, the periodic trigger, and the dashboard server.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config, secrets: &Secrets) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(config, secrets)?;
    let analytics = pipeline.backend();
    let (refresher, _worker) = spawn_refresher(pipeline);
    let _timer = spawn_periodic(
        refresher.clone(),
        Duration::from_secs(config.schedule.interval_secs),
        config.schedule.run_on_start,
    );

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    println!("Dashboard listening on http://{}", config.server.bind);

    let state = AppState::new(Arc::new(config.clone()), refresher, analytics);
    serve(listener, state).await
}

/// Serve the router on an already bound listener.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "dashboard server started");
    }
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Build the route table.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_dashboard).post(handle_dashboard_search))
        .route("/health", get(handle_health))
        .route("/api/status", get(handle_status))
        .route("/api/refresh", post(handle_refresh))
        .route("/api/comments", get(handle_comments))
        .route("/api/ranking", get(handle_ranking))
        .route("/api/search", post(handle_search))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        let status = match err {
            QueryError::Bind(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        };
        AppError {
            status,
            code: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Log a failed read query; the caller decides how to degrade.
fn logged(what: &str, result: QueryResult) -> QueryResult {
    if let Err(e) = &result {
        warn!(query = what, kind = e.kind(), error = %e, "analytics query failed");
    }
    result
}

// ============ GET|POST / ============

#[derive(Deserialize)]
struct SearchForm {
    #[serde(default)]
    query: String,
}

async fn handle_dashboard(State(state): State<AppState>) -> Html<String> {
    Html(build_dashboard(&state, None).await)
}

async fn handle_dashboard_search(
    State(state): State<AppState>,
    Form(form): Form<SearchForm>,
) -> Html<String> {
    Html(build_dashboard(&state, Some(form.query)).await)
}

async fn build_dashboard(state: &AppState, query: Option<String>) -> String {
    if state.config.schedule.refresh_on_request {
        if let Err(e) = state.refresher.refresh(RefreshTrigger::OnDemand).await {
            warn!(error = %format!("{:#}", e), "on-request refresh failed");
        }
    }

    let analytics = state.analytics.as_ref();
    let table = &state.config.analytics.table;

    let search = match query {
        Some(q) if !q.trim().is_empty() => {
            let result = semantic_search(analytics, &state.config.analytics, &q).await;
            Some(SearchView {
                query: q,
                result: logged("search", result),
            })
        }
        _ => None,
    };

    let comments = logged(
        "most_commented",
        analytics.run(&queries::most_commented(table)).await,
    );
    let ranking = logged(
        "user_ranking",
        analytics.run(&queries::user_ranking(table)).await,
    );

    let view = DashboardView {
        repository: format!(
            "{}/{}",
            state.config.source.owner, state.config.source.repo
        ),
        last_refresh: state.refresher.last_completed().await,
        charts: vec![
            ChartView {
                title: "Most Commented Issues",
                label_column: "issue_title",
                value_column: "total_comments",
                result: comments,
            },
            ChartView {
                title: "Top Users by Score",
                label_column: "comment_user",
                value_column: "user_score",
                result: ranking,
            },
        ],
        search,
    };
    render_dashboard(&view)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ /api ============

#[derive(Serialize)]
struct StatusResponse {
    last_refresh: Option<RefreshReport>,
}

async fn handle_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        last_refresh: state.refresher.last_completed().await,
    })
}

async fn handle_refresh(State(state): State<AppState>) -> Result<Json<RefreshReport>, AppError> {
    state
        .refresher
        .refresh(RefreshTrigger::OnDemand)
        .await
        .map(Json)
        .map_err(|e| internal(format!("{:#}", e)))
}

async fn handle_comments(State(state): State<AppState>) -> Result<Json<QueryTable>, AppError> {
    let stmt = queries::most_commented(&state.config.analytics.table);
    let table = logged("most_commented", state.analytics.run(&stmt).await)?;
    Ok(Json(table))
}

async fn handle_ranking(State(state): State<AppState>) -> Result<Json<QueryTable>, AppError> {
    let stmt = queries::user_ranking(&state.config.analytics.table);
    let table = logged("user_ranking", state.analytics.run(&stmt).await)?;
    Ok(Json(table))
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<QueryTable>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let result = semantic_search(
        state.analytics.as_ref(),
        &state.config.analytics,
        &req.query,
    )
    .await;
    Ok(Json(logged("search", result)?))
}
