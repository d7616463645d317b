// FIX Client Back-Office - Web Server
// JSON API and static pages with Axum

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use clap::Parser;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fix_clients::config::DEFAULT_CONFIG_PATH;
use fix_clients::db::{open_limit_or_empty, open_primary, seed_reference_data};
use fix_clients::entities::session::SESSION_NAME_MAX_LEN;
use fix_clients::entities::{NewCost, NewSession, ReferenceKind};
use fix_clients::{
    add_client, build_client_rows, client_detail, client_table, create_client_table, lookup_identity,
    lookup_trade_type, workbook_bytes, AddClientError, AddClientRequest, AppConfig, ClientStore, ExportError,
    FieldError, SqliteClientStore, SqliteLimitStore, StoreError,
};

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    limit_db: Arc<Mutex<Connection>>,
    template_path: Arc<PathBuf>,
}

impl AppState {
    fn new(db: Connection, limit_db: Connection, template_path: PathBuf) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            limit_db: Arc::new(Mutex::new(limit_db)),
            template_path: Arc::new(template_path),
        }
    }
}

fn lock(conn: &Mutex<Connection>) -> ApiResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| ApiError::Internal("database lock poisoned".to_string()))
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug)]
enum ApiError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<FieldError>,
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            StoreError::Protected { .. } => ApiError::Conflict(err.to_string()),
            StoreError::InvalidData(reason) => ApiError::BadRequest(reason),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AddClientError> for ApiError {
    fn from(err: AddClientError) -> Self {
        match err {
            AddClientError::Validation(errors) => ApiError::Validation(errors),
            AddClientError::Store(e) => e.into(),
        }
    }
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Store(e) => e.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, errors) = match &self {
            ApiError::Validation(errors) => (StatusCode::UNPROCESSABLE_ENTITY, errors.clone()),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, Vec::new()),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, Vec::new()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, Vec::new()),
            ApiError::Internal(reason) => {
                error!("Internal error: {}", reason);
                (StatusCode::INTERNAL_SERVER_ERROR, Vec::new())
            }
        };
        let body = Json(ErrorBody {
            success: false,
            error: self.to_string(),
            errors,
        });
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/clients/table - Column headers and rendered rows
async fn get_client_table(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let conn = lock(&state.db)?;
    let limit_conn = lock(&state.limit_db)?;

    let rows = build_client_rows(&SqliteClientStore::new(&conn), &SqliteLimitStore::new(&limit_conn))?;
    Ok(Json(ApiResponse::ok(client_table(&rows))))
}

/// GET /api/clients/:pk - Client detail
async fn get_client_detail(State(state): State<AppState>, Path(pk): Path<i64>) -> ApiResult<impl IntoResponse> {
    let conn = lock(&state.db)?;
    let limit_conn = lock(&state.limit_db)?;

    let detail = client_detail(&SqliteClientStore::new(&conn), &SqliteLimitStore::new(&limit_conn), pk)?
        .ok_or_else(|| ApiError::NotFound(format!("client not found: {}", pk)))?;
    Ok(Json(ApiResponse::ok(detail)))
}

/// POST /api/clients - Add-client workflow
async fn post_client(
    State(state): State<AppState>,
    Json(request): Json<AddClientRequest>,
) -> ApiResult<impl IntoResponse> {
    let conn = lock(&state.db)?;

    let persisted = add_client(&SqliteClientStore::new(&conn), &request)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(persisted))))
}

/// GET /api/sessions - Sessions offered by the add form
async fn get_sessions(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let conn = lock(&state.db)?;
    Ok(Json(ApiResponse::ok(SqliteClientStore::new(&conn).list_sessions()?)))
}

/// POST /api/sessions - Create a session
async fn post_session(
    State(state): State<AppState>,
    Json(session): Json<NewSession>,
) -> ApiResult<impl IntoResponse> {
    let name = session.name.trim();
    if name.is_empty() || name.chars().count() > SESSION_NAME_MAX_LEN {
        return Err(ApiError::BadRequest(format!(
            "session name must be 1 to {} characters",
            SESSION_NAME_MAX_LEN
        )));
    }

    let conn = lock(&state.db)?;
    let created = SqliteClientStore::new(&conn).create_session(&NewSession {
        name: name.to_string(),
        ..session
    })?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created))))
}

#[derive(Deserialize)]
struct NamePayload {
    name: String,
}

/// POST /api/reference/:kind - Create a vendor, currency, cost type, ...
async fn post_reference(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(payload): Json<NamePayload>,
) -> ApiResult<impl IntoResponse> {
    let kind: ReferenceKind = kind.parse().map_err(ApiError::BadRequest)?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name is required".to_string()));
    }

    let conn = lock(&state.db)?;
    let created = SqliteClientStore::new(&conn).create_reference(kind, name)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created))))
}

/// DELETE /api/reference/:kind/:id - Refused while still referenced
async fn delete_reference(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, i64)>,
) -> ApiResult<impl IntoResponse> {
    let kind: ReferenceKind = kind.parse().map_err(ApiError::BadRequest)?;

    let conn = lock(&state.db)?;
    SqliteClientStore::new(&conn).delete_reference(kind, id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/code-sessions/:id/costs - Attach a cost line
async fn post_cost(
    State(state): State<AppState>,
    Path(code_session_id): Path<i64>,
    Json(cost): Json<NewCost>,
) -> ApiResult<impl IntoResponse> {
    let conn = lock(&state.db)?;
    let created = SqliteClientStore::new(&conn).create_cost(code_session_id, &cost)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created))))
}

#[derive(Deserialize)]
struct LookupParams {
    key: Option<String>,
    value: Option<String>,
}

/// GET /clients/admin/client_classifier?key=&value=
async fn get_trade_type_lookup(
    State(state): State<AppState>,
    Query(params): Query<LookupParams>,
) -> ApiResult<impl IntoResponse> {
    let limit_conn = lock(&state.limit_db)?;
    Ok(Json(lookup_trade_type(
        &SqliteLimitStore::new(&limit_conn),
        params.key.as_deref(),
        params.value.as_deref(),
    )))
}

/// GET /clients/admin/client_identity?key=&value=
async fn get_identity_lookup(
    State(state): State<AppState>,
    Query(params): Query<LookupParams>,
) -> ApiResult<impl IntoResponse> {
    let limit_conn = lock(&state.limit_db)?;
    Ok(Json(lookup_identity(
        &SqliteLimitStore::new(&limit_conn),
        params.key.as_deref(),
        params.value.as_deref(),
    )))
}

/// GET /clients/export - Client table spreadsheet download
async fn export_client_table(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let rows = {
        let conn = lock(&state.db)?;
        let limit_conn = lock(&state.limit_db)?;
        build_client_rows(&SqliteClientStore::new(&conn), &SqliteLimitStore::new(&limit_conn))?
    };

    let (book, file_name) = create_client_table(&state.template_path, &rows)?;
    let bytes = workbook_bytes(&book)?;

    let disposition = format!("attachment; filename*=UTF-8''{}", urlencoding::encode(file_name));
    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

// ============================================================================
// Static pages
// ============================================================================

/// GET /, /clients/table - Client table page
async fn serve_index() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

/// GET /clients/:pk - Client detail page
async fn serve_detail() -> impl IntoResponse {
    Html(include_str!("../web/detail.html"))
}

/// GET /clients/add - Add-client form
async fn serve_add() -> impl IntoResponse {
    Html(include_str!("../web/add.html"))
}

// ============================================================================
// Main Server
// ============================================================================

fn app(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/clients", post(post_client))
        .route("/clients/table", get(get_client_table))
        .route("/clients/:pk", get(get_client_detail))
        .route("/sessions", get(get_sessions).post(post_session))
        .route("/code-sessions/:id/costs", post(post_cost))
        .route("/reference/:kind", post(post_reference))
        .route("/reference/:kind/:id", delete(delete_reference));

    // Static routes take priority over `/clients/:pk`
    Router::new()
        .route("/", get(serve_index))
        .route("/clients/table", get(serve_index))
        .route("/clients/add", get(serve_add))
        .route("/clients/export", get(export_client_table))
        .route("/clients/admin/client_classifier", get(get_trade_type_lookup))
        .route("/clients/admin/client_identity", get(get_identity_lookup))
        .route("/clients/:pk", get(serve_detail))
        .nest("/api", api_routes)
        .nest_service("/static", ServeDir::new("web"))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

#[derive(Parser)]
#[command(name = "fix-clients-server", version, about = "FIX client back-office web server")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = AppConfig::load(&args.config)?;

    let db_path = &config.database.primary_path;
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let conn = open_primary(db_path).context("Failed to open primary store")?;
    seed_reference_data(&conn)?;
    let limit_conn = open_limit_or_empty(&config.database.limit_path).context("Failed to open limit store")?;

    let state = AppState::new(conn, limit_conn, config.export.template_path.clone());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind_addr))?;

    info!(addr = %config.server.bind_addr, "Server running");
    axum::serve(listener, app(state)).await.context("Server error")?;

    Ok(())
}
