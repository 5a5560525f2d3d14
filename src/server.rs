//! HTTP JSON API.
//!
//! # Endpoints
//!
//! | Method   | Path | Description |
//! |----------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `GET`    | `/documents` | All documents, newest first |
//! | `GET`    | `/documents/catalog` | Documents grouped by the `[[catalog]]` taxonomy |
//! | `GET`    | `/documents/pending` | Documents not processed yet |
//! | `POST`   | `/documents` | Register a linked document `{url, name?, category?, file_type?}` |
//! | `POST`   | `/documents/upload?name=&category=` | Upload a raw body; `Content-Type` is the file type |
//! | `GET`    | `/documents/{id}` | Document with its extracted text and chunks |
//! | `PATCH`  | `/documents/{id}` | Update `{enabled?, name?, category?}` |
//! | `DELETE` | `/documents/{id}` | Delete document, chunks, vectors, and stored file |
//! | `POST`   | `/documents/{id}/process` | Process one document, optional `{content}` |
//! | `POST`   | `/documents/process-pending` | Process every pending document |
//! | `POST`   | `/search` | `{query, limit?}` → retrieved chunks |
//! | `POST`   | `/chat` | `{question}` → `{answer, sources, snippets}` |
//! | `GET`    | `/stats` | Library statistics |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `provider_disabled` (400),
//! `payload_too_large` (413), `unsupported` (415), `internal` (500).
//!
//! Malformed bodies and query strings are rejected with the same envelope,
//! as are unknown routes.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! can be served from anywhere.

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, JsonRejection, QueryRejection},
        DefaultBodyLimit, FromRequest, FromRequestParts, Path, Query, Request, State,
    },
    http::{header, request::Parts, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::catalog::{group_documents, CatalogGroup};
use crate::chat;
use crate::context::AppContext;
use crate::documents;
use crate::error::DocChatError;
use crate::extract::ExtractError;
use crate::ingest::{self, BatchReport, ProcessReport};
use crate::models::{ChatAnswer, Chunk, Document, DocumentPatch, RetrievedChunk};
use crate::retrieve::retrieve;
use crate::stats::{collect_stats, Stats};

/// Build the router. Split out from [`run_server`] so it can be driven
/// in-process.
pub fn router(ctx: AppContext) -> Router {
    let max_upload = ctx.config.server.max_upload_bytes;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/documents",
            get(handle_list_documents).post(handle_add_url),
        )
        .route("/documents/catalog", get(handle_catalog))
        .route("/documents/pending", get(handle_pending))
        .route("/documents/upload", post(handle_upload))
        .route("/documents/process-pending", post(handle_process_pending))
        .route(
            "/documents/{id}",
            get(handle_get_document)
                .patch(handle_update_document)
                .delete(handle_delete_document),
        )
        .route("/documents/{id}/process", post(handle_process_document))
        .route("/search", post(handle_search))
        .route("/chat", post(handle_chat))
        .route("/stats", get(handle_stats))
        .fallback(handle_unknown_route)
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(cors)
        .with_state(ctx)
}

/// Serve on `[server].bind` until the process is terminated.
pub async fn run_server(ctx: AppContext) -> anyhow::Result<()> {
    let bind_addr = ctx.config.server.bind.clone();
    let app = router(ctx);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "server listening");
    println!("Listening on http://{}", bind_addr);

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
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: &'static str,
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
        code: "bad_request",
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

fn provider_disabled(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "provider_disabled",
        message: message.into(),
    }
}

fn unsupported(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNSUPPORTED_MEDIA_TYPE,
        code: "unsupported",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

/// Map an extractor rejection onto the error envelope.
fn rejected(status: StatusCode, message: String) -> AppError {
    match status {
        StatusCode::UNSUPPORTED_MEDIA_TYPE => unsupported(message),
        StatusCode::PAYLOAD_TOO_LARGE => AppError {
            status,
            code: "payload_too_large",
            message,
        },
        _ => bad_request(message),
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        rejected(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        rejected(rejection.status(), rejection.body_text())
    }
}

impl From<BytesRejection> for AppError {
    fn from(rejection: BytesRejection) -> Self {
        rejected(rejection.status(), rejection.body_text())
    }
}

/// Map library errors to status codes by their classifiable cause.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        let message = format!("{:#}", err);

        if let Some(e) = err.downcast_ref::<DocChatError>() {
            return match e {
                DocChatError::NotFound(_) => not_found(message),
                DocChatError::InvalidInput(_) => bad_request(message),
                DocChatError::ProviderDisabled(_) => provider_disabled(message),
                DocChatError::Unsupported(_) => unsupported(message),
            };
        }
        if let Some(e) = err.downcast_ref::<ExtractError>() {
            return match e {
                ExtractError::UnsupportedContentType(_) => unsupported(message),
                ExtractError::Pdf(_) | ExtractError::Docx(_) => bad_request(message),
            };
        }

        tracing::error!(error = %message, "request failed");
        internal(message)
    }
}

// ============ Extractors ============
//
// Thin wrappers over axum's extractors whose rejections are `AppError`s.

struct ApiJson<T>(T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

struct ApiQuery<T>(T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

struct ApiBytes(Bytes);

impl<S> FromRequest<S> for ApiBytes
where
    Bytes: FromRequest<S, Rejection = BytesRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(Bytes::from_request(req, state).await?))
    }
}

async fn handle_unknown_route(uri: Uri) -> AppError {
    not_found(format!("no route for {}", uri.path()))
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

// ============ Documents ============

#[derive(Serialize)]
struct DocumentListResponse {
    documents: Vec<Document>,
}

async fn handle_list_documents(
    State(ctx): State<AppContext>,
) -> Result<Json<DocumentListResponse>, AppError> {
    let documents = documents::list_documents(&ctx.pool).await?;
    Ok(Json(DocumentListResponse { documents }))
}

async fn handle_pending(
    State(ctx): State<AppContext>,
) -> Result<Json<DocumentListResponse>, AppError> {
    let documents = documents::list_pending(&ctx.pool).await?;
    Ok(Json(DocumentListResponse { documents }))
}

#[derive(Serialize)]
struct CatalogResponse {
    groups: Vec<CatalogGroup>,
}

async fn handle_catalog(State(ctx): State<AppContext>) -> Result<Json<CatalogResponse>, AppError> {
    let docs = documents::list_documents(&ctx.pool).await?;
    Ok(Json(CatalogResponse {
        groups: group_documents(&ctx.config.catalog, &docs),
    }))
}

#[derive(Deserialize)]
struct AddUrlRequest {
    url: String,
    name: Option<String>,
    category: Option<String>,
    file_type: Option<String>,
}

async fn handle_add_url(
    State(ctx): State<AppContext>,
    ApiJson(req): ApiJson<AddUrlRequest>,
) -> Result<(StatusCode, Json<Document>), AppError> {
    if req.url.trim().is_empty() {
        return Err(bad_request("url must not be empty"));
    }
    let doc = documents::add_url(&ctx.pool, &req.url, req.name, req.category, req.file_type).await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

#[derive(Deserialize)]
struct UploadParams {
    name: String,
    category: Option<String>,
}

async fn handle_upload(
    State(ctx): State<AppContext>,
    ApiQuery(params): ApiQuery<UploadParams>,
    headers: HeaderMap,
    ApiBytes(body): ApiBytes,
) -> Result<(StatusCode, Json<Document>), AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    let doc = documents::add_bytes(
        &ctx.config,
        &ctx.pool,
        &params.name,
        &body,
        content_type,
        params.category,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

#[derive(Serialize)]
struct DocumentDetailResponse {
    document: Document,
    chunks: Vec<Chunk>,
}

async fn handle_get_document(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<DocumentDetailResponse>, AppError> {
    let document = documents::get_document(&ctx.pool, &id).await?;
    let chunks = documents::get_chunks(&ctx.pool, &id).await?;
    Ok(Json(DocumentDetailResponse { document, chunks }))
}

async fn handle_update_document(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<DocumentPatch>,
) -> Result<Json<Document>, AppError> {
    let doc = documents::update_document(&ctx.pool, &id, &patch).await?;
    Ok(Json(doc.into_summary()))
}

async fn handle_delete_document(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    documents::delete_document(&ctx.config, &ctx.pool, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct ProcessRequest {
    content: Option<String>,
}

/// The body is optional; an empty body means "extract from the stored file".
async fn handle_process_document(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    ApiBytes(body): ApiBytes,
) -> Result<Json<ProcessReport>, AppError> {
    let content = if body.is_empty() {
        None
    } else {
        let req: ProcessRequest = serde_json::from_slice(&body)
            .map_err(|e| bad_request(format!("invalid JSON body: {}", e)))?;
        req.content
    };

    let report = ingest::process_document(&ctx, &id, content).await?;
    Ok(Json(report))
}

async fn handle_process_pending(
    State(ctx): State<AppContext>,
) -> Result<Json<BatchReport>, AppError> {
    let report = ingest::process_pending(&ctx).await?;
    Ok(Json(report))
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<RetrievedChunk>,
}

async fn handle_search(
    State(ctx): State<AppContext>,
    ApiJson(req): ApiJson<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if req.limit == Some(0) {
        return Err(bad_request("limit must be >= 1"));
    }

    let results = retrieve(&ctx, &req.query, req.limit).await?;
    Ok(Json(SearchResponse { results }))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    question: String,
}

async fn handle_chat(
    State(ctx): State<AppContext>,
    ApiJson(req): ApiJson<ChatRequest>,
) -> Result<Json<ChatAnswer>, AppError> {
    let answer = chat::answer(&ctx, &req.question).await?;
    Ok(Json(answer))
}

// ============ GET /stats ============

async fn handle_stats(State(ctx): State<AppContext>) -> Result<Json<Stats>, AppError> {
    Ok(Json(collect_stats(&ctx).await?))
}
