//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/chat` | Answer a question with citations |
//! | `POST` | `/api/ingest` | Ingest the document store into the index |
//! | `PUT`  | `/api/index` | Create or update the search index |
//! | `DELETE` | `/api/index` | Delete the search index |
//! | `GET`  | `/health` | Health check with version and config summary |
//! | `GET`  | `/` | Name and version banner |
//! | `GET`  | `/files/{*name}` | Signed PDF download (filesystem storage only) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `forbidden` (403), `not_found` (404),
//! `ingest_in_progress` (409), `ingest_failed` (500), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser chat UI can
//! call the API directly.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use docent_core::ingest::IngestReport;
use docent_core::pipeline::{AnswerRequest, AnswerResponse};

use crate::app::AppContext;
use crate::config::ConfigSummary;
use crate::storage_fs::LinkError;

/// Build the router over a shared [`AppContext`].
pub fn router(ctx: Arc<AppContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/api/chat", post(handle_chat))
        .route("/api/ingest", post(handle_ingest))
        .route("/api/index", put(handle_create_index).delete(handle_delete_index))
        .route("/files/{*name}", get(handle_file))
        .layer(cors)
        .with_state(ctx)
}

/// Bind `[server].bind` and serve until the process is terminated.
pub async fn run_server(ctx: Arc<AppContext>) -> Result<()> {
    let bind_addr = ctx.config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "docent listening");
    axum::serve(listener, router(ctx)).await?;
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn forbidden(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::FORBIDDEN,
        code: "forbidden",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(code: &'static str, message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code,
        message: message.into(),
    }
}

// ============ GET / and /health ============

#[derive(Serialize)]
struct BannerResponse {
    name: &'static str,
    version: &'static str,
}

async fn handle_root() -> Json<BannerResponse> {
    Json(BannerResponse {
        name: "docent",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    config: ConfigSummary,
}

async fn handle_health(State(ctx): State<Arc<AppContext>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        config: ctx.summary.clone(),
    })
}

// ============ POST /api/chat ============

async fn handle_chat(
    State(ctx): State<Arc<AppContext>>,
    body: Result<Json<AnswerRequest>, JsonRejection>,
) -> Result<Json<AnswerResponse>, AppError> {
    let Json(req) = body.map_err(|e| bad_request(e.body_text()))?;
    let response = ctx
        .pipeline
        .answer(&req)
        .await
        .map_err(|e| bad_request(e.to_string()))?;
    Ok(Json(response))
}

// ============ POST /api/ingest ============

#[derive(Debug, Default, Deserialize)]
struct IngestBody {
    #[serde(default)]
    force_reindex: bool,
}

async fn handle_ingest(
    State(ctx): State<Arc<AppContext>>,
    body: Bytes,
) -> Result<Json<IngestReport>, AppError> {
    let params: IngestBody = if body.iter().all(u8::is_ascii_whitespace) {
        IngestBody::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| bad_request(format!("invalid body: {e}")))?
    };

    let _guard = ctx.ingest_lock.try_lock().map_err(|_| AppError {
        status: StatusCode::CONFLICT,
        code: "ingest_in_progress",
        message: "an ingestion run is already in progress".to_string(),
    })?;

    let report = ctx.ingest.run(params.force_reindex).await.map_err(|e| {
        tracing::error!(error = %e, "ingestion aborted");
        internal("ingest_failed", e.to_string())
    })?;
    Ok(Json(report))
}

// ============ PUT / DELETE /api/index ============

#[derive(Serialize)]
struct IndexResponse {
    status: &'static str,
    index: String,
}

async fn handle_create_index(
    State(ctx): State<Arc<AppContext>>,
) -> Result<Json<IndexResponse>, AppError> {
    ctx.search.ensure_index().await.map_err(|e| {
        tracing::error!(error = %format!("{e:#}"), "index creation failed");
        internal("internal", "failed to create or update the search index")
    })?;
    Ok(Json(IndexResponse {
        status: "ok",
        index: ctx.search.index_name().to_string(),
    }))
}

async fn handle_delete_index(
    State(ctx): State<Arc<AppContext>>,
) -> Result<Json<IndexResponse>, AppError> {
    ctx.search.delete_index().await.map_err(|e| {
        tracing::error!(error = %format!("{e:#}"), "index deletion failed");
        internal("internal", "failed to delete the search index")
    })?;
    Ok(Json(IndexResponse {
        status: "deleted",
        index: ctx.search.index_name().to_string(),
    }))
}

// ============ GET /files/{*name} ============

#[derive(Debug, Deserialize)]
struct FileQuery {
    expires: Option<i64>,
    sig: Option<String>,
}

async fn handle_file(
    State(ctx): State<Arc<AppContext>>,
    Path(name): Path<String>,
    Query(query): Query<FileQuery>,
) -> Result<Response, AppError> {
    let files = ctx
        .files
        .as_ref()
        .ok_or_else(|| not_found("file serving is not enabled"))?;

    let (Some(expires), Some(sig)) = (query.expires, query.sig) else {
        return Err(forbidden("missing link signature"));
    };
    files
        .verify_link(&name, expires, &sig, Utc::now().timestamp())
        .map_err(|e| forbidden(e.to_string()))?;

    let path = files.resolve(&name).map_err(|e| match e {
        LinkError::BadPath => not_found(format!("document not found: {}", name)),
        other => forbidden(other.to_string()),
    })?;
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        tracing::error!(error = %e, path = %path.display(), "failed to read document");
        internal("internal", "failed to read document")
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf"),
            (header::CONTENT_DISPOSITION, "inline"),
        ],
        bytes,
    )
        .into_response())
}
