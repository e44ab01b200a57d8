//! HTTP Server for the bulk import API.
//!
//! Provides per-kind template download and bulk upload endpoints for the
//! admin console. Every `/api/{kind}/...` route requires a bearer token,
//! which is checked with the backend before the upload is read.
//!
//! # API Endpoints
//!
//! | Method | Path                      | Description                   |
//! |--------|---------------------------|-------------------------------|
//! | GET    | `/health`                 | Health check                  |
//! | GET    | `/api/{kind}/bulk-template` | Header-only CSV template    |
//! | GET    | `/api/{kind}/columns`     | Column contract as JSON       |
//! | POST   | `/api/{kind}/bulk-upload` | Upload CSV for import         |
//! | GET    | `/api/logs`               | SSE stream for real-time logs |

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::logs::{log_info, log_warning, LOG_BROADCASTER};
use super::types::{error_response, ColumnInfo, UploadResponse};
use crate::config::AppConfig;
use crate::error::{ImportError, ServerError, ServerResult, StoreError};
use crate::import::BulkImporter;
use crate::models::EntityKind;
use crate::schema;
use crate::store::{BearerToken, EntityStore, InMemoryStore, MemoryConnector, RestConnector, StoreConnector};

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

type ApiError = (StatusCode, Json<Value>);

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub connector: Arc<dyn StoreConnector>,
    pub concurrency: usize,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(connector: Arc<dyn StoreConnector>, config: &AppConfig) -> Self {
        Self {
            connector,
            concurrency: config.concurrency,
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // Permissive CORS: the console is served from another origin
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    let body_limit = state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/{kind}/bulk-template", get(bulk_template))
        .route("/api/{kind}/columns", get(columns))
        .route("/api/{kind}/bulk-upload", post(bulk_upload))
        .route("/api/logs", get(sse_logs))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn start_server(config: AppConfig) -> ServerResult<()> {
    let connector: Arc<dyn StoreConnector> = if config.memory {
        Arc::new(MemoryConnector::new(Arc::new(InMemoryStore::new())))
    } else {
        let rest = config.rest_config()?;
        Arc::new(RestConnector::new(rest).map_err(|e| ServerError::Client(e.to_string()))?)
    };

    let app = build_router(AppState::new(connector, &config));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    println!("🚀 Bulkload server running on http://localhost:{}", config.port);
    println!("   GET  /api/{{kind}}/bulk-template - CSV template");
    println!("   GET  /api/{{kind}}/columns       - Column contract");
    println!("   POST /api/{{kind}}/bulk-upload   - Upload CSV file");
    println!("   GET  /api/logs                 - SSE log stream");
    println!("   GET  /health                   - Health check");
    println!();
    match &config.backend_url {
        Some(url) if !config.memory => println!("📝 Backend: {url}"),
        _ => println!("📝 Backend: in-memory store (records are not persisted)"),
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log_info(format!("Server listening on port {}", config.port));
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    let kinds: Vec<&str> = EntityKind::ALL.iter().map(|k| k.slug()).collect();
    Json(json!({
        "status": "ok",
        "service": "bulkload",
        "version": env!("CARGO_PKG_VERSION"),
        "kinds": kinds,
        "endpoints": {
            "template": "GET /api/{kind}/bulk-template",
            "columns": "GET /api/{kind}/columns",
            "upload": "POST /api/{kind}/bulk-upload",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Template download endpoint
async fn bulk_template(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    authorize(&state, &headers).await?;

    let disposition = format!("attachment; filename=\"{}\"", schema::template_filename(kind));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        schema::template_for(kind),
    ))
}

/// Column contract endpoint
async fn columns(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<ColumnInfo>>, ApiError> {
    let kind = parse_kind(&kind)?;
    authorize(&state, &headers).await?;

    Ok(Json(schema::spec_for(kind).iter().map(ColumnInfo::from).collect()))
}

/// Bulk upload endpoint
async fn bulk_upload(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let kind = parse_kind(&kind)?;
    let store = authorize(&state, &headers).await?;

    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("file") {
            file_name = field.file_name().map(|s| s.to_string());
            file_data = Some(field.bytes().await.map_err(multipart_error)?.to_vec());
        }
    }

    let bytes = file_data.ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "No file provided"))?;

    if let Some(name) = &file_name {
        if !name.to_lowercase().ends_with(".csv") {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                &format!("Unsupported file type '{name}': upload a .csv file"),
            ));
        }
    }
    if bytes.len() > state.max_upload_bytes {
        return Err(api_error(
            StatusCode::PAYLOAD_TOO_LARGE,
            &format!("File exceeds the {} byte upload limit", state.max_upload_bytes),
        ));
    }

    log_info(format!(
        "New {} upload: {} ({} bytes)",
        kind.label(),
        file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    ));

    let result = BulkImporter::new(store)
        .with_concurrency(state.concurrency)
        .run(&bytes, kind)
        .await
        .map_err(import_error)?;

    Ok(Json(UploadResponse::from(result)))
}

fn parse_kind(slug: &str) -> Result<EntityKind, ApiError> {
    EntityKind::from_slug(slug)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, &format!("Unknown entity kind '{slug}'")))
}

/// Resolve the caller's token to a store, or refuse the whole request.
async fn authorize(state: &AppState, headers: &HeaderMap) -> Result<Arc<dyn EntityStore>, ApiError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(BearerToken::from_header)
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Missing bearer token"))?;

    state.connector.connect(&token).await.map_err(|e| {
        log_warning(format!("Request refused: {e}"));
        match e {
            StoreError::Unauthorized(msg) => api_error(StatusCode::UNAUTHORIZED, &msg),
            other => api_error(StatusCode::BAD_GATEWAY, &other.to_string()),
        }
    })
}

fn import_error(err: ImportError) -> ApiError {
    let status = match err {
        ImportError::MalformedInput(_) => StatusCode::BAD_REQUEST,
        ImportError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        ImportError::Transport(_) => StatusCode::BAD_GATEWAY,
    };
    api_error(status, &err.to_string())
}

fn multipart_error(err: MultipartError) -> ApiError {
    api_error(err.status(), &format!("Multipart error: {}", err.body_text()))
}

fn api_error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(error_response(message)))
}
