//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/query` | Answer a question: `{query}` → `{response}` |
//! | `POST` | `/admin/login` | Exchange the admin token for a session cookie |
//! | `POST` | `/admin/upload` | Ingest a PDF (multipart field `file`) |
//! | `DELETE` | `/admin/delete/{filename}` | Remove a document and its chunks |
//! | `GET`  | `/admin/uploads` | Upload log with file state |
//! | `GET`  | `/admin/stats` | Upload totals |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Admin routes accept either an `x-admin-token` header equal to
//! `server.admin_token` or the session cookie issued by `/admin/login`.
//! With no token configured every admin request is refused.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Only PDF files are allowed" } }
//! ```
//!
//! Error codes: `bad_request` (400), `extraction_failed` (400),
//! `forbidden` (403), `internal` (500), `provider_error` (502).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use askdoc_core::compose::{Answer, Composer, ComposerSettings};
use askdoc_core::generation::GenerationProvider;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::Config;
use crate::extract::PdfExtractor;
use crate::ingest::Ingestor;
use crate::knowledge::{JsonFileStore, KnowledgeBaseHandle};
use crate::upload_log::UploadLog;
use crate::{embedding, generation};

/// Header carrying the admin token.
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";
/// Cookie carrying an admin session id.
pub const SESSION_COOKIE: &str = "askdoc_session";

/// Multipart framing allowance on top of `upload.max_bytes`.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// How long an admin session stays valid after login.
const SESSION_TTL: Duration = Duration::from_secs(8 * 60 * 60);
/// Live sessions kept at once; the oldest is dropped past this.
const MAX_SESSIONS: usize = 256;

/// Admin sessions issued by `/admin/login`, keyed by id with issue time.
#[derive(Default)]
struct Sessions {
    issued: HashMap<String, Instant>,
}

impl Sessions {
    /// Issue a new session id, first dropping expired sessions and, when
    /// full, the oldest one.
    fn issue(&mut self, now: Instant) -> String {
        self.issued
            .retain(|_, at| now.saturating_duration_since(*at) < SESSION_TTL);
        if self.issued.len() >= MAX_SESSIONS {
            let oldest = self
                .issued
                .iter()
                .min_by_key(|(_, at)| **at)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                self.issued.remove(&oldest);
            }
        }
        let id = Uuid::new_v4().to_string();
        self.issued.insert(id.clone(), now);
        id
    }

    fn is_valid(&self, id: &str, now: Instant) -> bool {
        self.issued
            .get(id)
            .is_some_and(|at| now.saturating_duration_since(*at) < SESSION_TTL)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.issued.len()
    }
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    settings: Arc<ComposerSettings>,
    knowledge: Arc<KnowledgeBaseHandle>,
    ingestor: Arc<Ingestor>,
    log: Arc<UploadLog>,
    generator: Option<Arc<dyn GenerationProvider>>,
    admin_digest: Option<Vec<u8>>,
    sessions: Arc<RwLock<Sessions>>,
}

impl AppState {
    pub fn new(
        config: Config,
        knowledge: Arc<KnowledgeBaseHandle>,
        ingestor: Arc<Ingestor>,
        log: Arc<UploadLog>,
        generator: Option<Arc<dyn GenerationProvider>>,
    ) -> Self {
        let admin_digest = config
            .server
            .admin_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(digest);
        Self {
            settings: Arc::new(config.composer_settings()),
            config: Arc::new(config),
            knowledge,
            ingestor,
            log,
            generator,
            admin_digest,
            sessions: Arc::new(RwLock::new(Sessions::default())),
        }
    }

    /// Wire up the JSON stores, providers and PDF extractor from config.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let embedder = embedding::create_provider(&config.embedding)?;
        let store = Arc::new(JsonFileStore::new(&config.storage.knowledge_base));
        let knowledge = Arc::new(KnowledgeBaseHandle::open(store, embedder).await?);
        let log = Arc::new(UploadLog::new(
            &config.storage.upload_log,
            &config.storage.upload_dir,
        ));
        let ingestor = Arc::new(Ingestor::new(
            knowledge.clone(),
            log.clone(),
            Arc::new(PdfExtractor),
            config.chunking.options(),
            config.upload.max_bytes,
        ));
        let generator = generation::create_provider(&config.generation)?;

        Ok(Self::new(config.clone(), knowledge, ingestor, log, generator))
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeBaseHandle> {
        &self.knowledge
    }

    pub fn ingestor(&self) -> &Arc<Ingestor> {
        &self.ingestor
    }

    pub fn upload_log(&self) -> &Arc<UploadLog> {
        &self.log
    }

    /// Answer `query` against the current knowledge base snapshot.
    pub async fn answer(&self, query: &str) -> askdoc_core::Result<Answer> {
        let kb = self.knowledge.snapshot();
        Composer::new(&self.settings, self.knowledge.embedder().as_ref())
            .with_generator(self.generator.as_deref())
            .answer(kb.as_ref(), query)
            .await
    }

    fn token_matches(&self, candidate: &str) -> bool {
        match &self.admin_digest {
            Some(expected) => digest(candidate) == *expected,
            None => false,
        }
    }

    fn require_admin(&self, headers: &HeaderMap) -> Result<(), AppError> {
        if self.admin_digest.is_none() {
            return Err(forbidden("admin access is disabled"));
        }
        if let Some(token) = headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            if self.token_matches(token) {
                return Ok(());
            }
        }
        if let Some(session) = session_cookie(headers) {
            if self.sessions.read().is_valid(session, Instant::now()) {
                return Ok(());
            }
        }
        Err(forbidden("admin authorization required"))
    }
}

fn digest(value: &str) -> Vec<u8> {
    Sha256::digest(value.as_bytes()).to_vec()
}

fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
}

/// Build the router with CORS and request tracing.
pub fn router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.upload.max_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/query", post(handle_query))
        .route("/admin/login", post(handle_login))
        .route(
            "/admin/upload",
            post(handle_upload).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/admin/delete/{filename}", delete(handle_delete))
        .route("/admin/uploads", get(handle_uploads))
        .route("/admin/stats", get(handle_stats))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the application state and serve until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::open(config).await?;
    if state.admin_digest.is_none() {
        tracing::warn!("no admin token configured, admin endpoints are disabled");
    }

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "askdoc listening");
    axum::serve(listener, router(state)).await?;

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

pub struct AppError {
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

impl From<askdoc_core::Error> for AppError {
    fn from(err: askdoc_core::Error) -> Self {
        use askdoc_core::Error;

        let (status, code) = match &err {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::Extraction(_) => (StatusCode::BAD_REQUEST, "extraction_failed"),
            Error::Provider { .. } => (StatusCode::BAD_GATEWAY, "provider_error"),
            Error::CorruptStore(_) | Error::Storage(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        let message = match err {
            Error::Validation(m) => m,
            other => other.to_string(),
        };
        AppError {
            status,
            code,
            message,
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

fn forbidden(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::FORBIDDEN,
        code: "forbidden",
        message: message.into(),
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

// ============ POST /query ============

#[derive(Deserialize, Default)]
struct QueryRequest {
    #[serde(default)]
    query: Option<String>,
}

#[derive(Serialize)]
struct QueryResponse {
    response: String,
}

/// A missing body or `query` field counts as an empty query.
async fn handle_query(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<QueryResponse>, AppError> {
    let request: QueryRequest = if body.iter().all(u8::is_ascii_whitespace) {
        QueryRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| bad_request(format!("invalid JSON body: {}", e)))?
    };
    let query = request.query.unwrap_or_default();

    let answer = state.answer(&query).await?;
    tracing::debug!(route = ?answer.route, "query answered");
    Ok(Json(QueryResponse {
        response: answer.response,
    }))
}

// ============ POST /admin/login ============

#[derive(Deserialize)]
struct LoginRequest {
    token: String,
}

async fn handle_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, AppError> {
    if !state.token_matches(&request.token) {
        return Err(forbidden("invalid admin token"));
    }

    let session = state.sessions.write().issue(Instant::now());
    let cookie = format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        SESSION_COOKIE,
        session,
        SESSION_TTL.as_secs()
    );
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(serde_json::json!({ "ok": true })),
    )
        .into_response())
}

// ============ POST /admin/upload ============

#[derive(Serialize)]
struct UploadResponse {
    success: bool,
    filename: String,
    chunks_added: usize,
    pages_processed: usize,
}

async fn handle_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    state.require_admin(&headers)?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((filename, bytes));
        break;
    }
    let (filename, bytes) = upload.ok_or_else(|| bad_request("No file provided"))?;
    if filename.is_empty() {
        return Err(bad_request("No file provided"));
    }

    let report = state.ingestor.ingest(&filename, bytes.to_vec()).await?;
    Ok(Json(UploadResponse {
        success: true,
        filename: report.filename,
        chunks_added: report.chunks_added,
        pages_processed: report.pages_processed,
    }))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError {
        status: err.status(),
        code: "bad_request",
        message: err.body_text(),
    }
}

// ============ DELETE /admin/delete/{filename} ============

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
    chunks_removed: usize,
    message: String,
}

async fn handle_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(filename): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    state.require_admin(&headers)?;

    let report = state.ingestor.delete(&filename).await?;
    Ok(Json(DeleteResponse {
        success: true,
        chunks_removed: report.chunks_removed,
        message: format!("Successfully deleted {}", report.filename),
    }))
}

// ============ GET /admin/uploads, /admin/stats ============

async fn handle_uploads(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    state.require_admin(&headers)?;
    Ok(Json(state.log.listing().await?).into_response())
}

async fn handle_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    state.require_admin(&headers)?;
    Ok(Json(state.log.stats().await?).into_response())
}
