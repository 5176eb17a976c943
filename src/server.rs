//! HTTP API for project cards.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/api/v1/projects/search?q=` | Fuzzy search, best match first |
//! | `GET`    | `/api/v1/projects` | All projects |
//! | `POST`   | `/api/v1/projects` | Create a project (id assigned when blank) |
//! | `GET`    | `/api/v1/projects/{id}` | One project |
//! | `DELETE` | `/api/v1/projects/{id}` | Delete a project |
//! | `GET`    | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "project not found: 42" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `conflict` (409),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::ingest;
use crate::models::ProjectRecord;
use crate::notify::{NotifyOutcome, Notifier};
use crate::search::search_projects;
use crate::store::{generate_next_id, SqliteStore, Store};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn Store>,
    notifier: Arc<Notifier>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, notifier: Notifier) -> Self {
        Self {
            store,
            notifier: Arc::new(notifier),
        }
    }
}

/// Builds the API router over `state`.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/projects/search", get(handle_search))
        .route(
            "/api/v1/projects",
            get(handle_list).post(handle_create),
        )
        .route(
            "/api/v1/projects/{id}",
            get(handle_get).delete(handle_delete),
        )
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server.
///
/// When a spreadsheet source is configured, one ingestion cycle runs before
/// the listener is bound. Its failure is logged and the server starts with
/// whatever the store already holds.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = Arc::new(SqliteStore::connect(config).await?);

    if let Some(sheet) = &config.spreadsheet {
        ingest::refresh_on_startup(store.as_ref(), sheet).await;
    }

    let state = AppState::new(store, Notifier::new(&config.notify)?);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "project cards server listening");
    println!("Project cards server listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;

    Ok(())
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

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        error!(error = %err, "request failed");
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(id: &str) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: format!("project not found: {}", id),
    }
}

fn conflict(id: &str) -> AppError {
    AppError {
        status: StatusCode::CONFLICT,
        code: "conflict",
        message: format!("project already exists: {}", id),
    }
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

// ============ GET /api/v1/projects/search ============

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

/// Matching records, best first. A blank `q` yields `[]`.
async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<ProjectRecord>>, AppError> {
    let hits = search_projects(state.store.as_ref(), &params.q).await?;
    Ok(Json(hits.into_iter().map(|h| h.record).collect()))
}

// ============ GET /api/v1/projects ============

async fn handle_list(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProjectRecord>>, AppError> {
    Ok(Json(state.store.find_all().await?))
}

// ============ POST /api/v1/projects ============

/// Created record plus a warning when the row notification did not go out.
#[derive(Serialize)]
struct CreateResponse {
    #[serde(flatten)]
    record: ProjectRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
}

/// Attempts at claiming a generated id before a create gives up.
const MAX_ID_ATTEMPTS: usize = 64;

/// Stores `record` under the next free sequential id. A concurrent create
/// can claim the same id first, in which case the id is recomputed.
async fn insert_with_next_id(
    store: &dyn Store,
    record: &mut ProjectRecord,
) -> Result<(), AppError> {
    for _ in 0..MAX_ID_ATTEMPTS {
        record.id = generate_next_id(store).await?;
        if store.insert(record).await? {
            return Ok(());
        }
    }
    Err(AppError {
        status: StatusCode::CONFLICT,
        code: "conflict",
        message: format!("no free project id after {} attempts", MAX_ID_ATTEMPTS),
    })
}

async fn handle_create(
    State(state): State<AppState>,
    payload: Result<Json<ProjectRecord>, axum::extract::rejection::JsonRejection>,
) -> Result<(StatusCode, Json<CreateResponse>), AppError> {
    let Json(mut record) = payload.map_err(|e| bad_request(e.body_text()))?;

    record.id = record.id.trim().to_string();
    if record.id.is_empty() {
        insert_with_next_id(state.store.as_ref(), &mut record).await?;
    } else if !state.store.insert(&record).await? {
        return Err(conflict(&record.id));
    }
    info!(id = %record.id, "project created");

    let warning = match state.notifier.project_created(&record).await {
        NotifyOutcome::Failed(reason) => {
            warn!(id = %record.id, %reason, "project saved but row notification failed");
            Some(format!("row notification failed: {}", reason))
        }
        NotifyOutcome::Delivered | NotifyOutcome::Logged => None,
    };

    Ok((StatusCode::CREATED, Json(CreateResponse { record, warning })))
}

// ============ GET /api/v1/projects/{id} ============

async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProjectRecord>, AppError> {
    state
        .store
        .find_by_id(&id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

// ============ DELETE /api/v1/projects/{id} ============

async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.store.delete_by_id(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(&id))
    }
}
