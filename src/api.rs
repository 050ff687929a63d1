//! HTTP surface for the document chat server.
//!
//! - `GET /` – Welcome message pointing at the two main endpoints.
//! - `POST /upload` – Multipart upload (field `file`) of a PDF; the document is stored, chunked,
//!   embedded, and indexed, replacing whatever document was active before.
//! - `POST /ask` – `{"question": "..."}`; answers from the active document and lists the chunks
//!   used as context.
//! - `GET /status` – Metadata of the active document (or `null`).
//! - `GET /metrics` – Upload and question counters.
//! - `GET /commands` – Machine-readable catalog of the routes above.
//!
//! Errors are always JSON objects of the form `{"error": "..."}`.

use crate::config::Config;
use crate::document::DocumentError;
use crate::processing::{DocumentApi, DocumentStatus, ProcessingError, SourceRef};
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::MultipartRejection,
        rejection::JsonRejection,
    },
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

const WELCOME_MESSAGE: &str = "Welcome to the Chat with Documents API! Use /upload to upload documents and /ask to ask questions.";

/// Router-level options that do not belong to the processing service.
#[derive(Debug, Clone)]
pub struct ApiOptions {
    /// Maximum accepted request body size.
    pub max_upload_bytes: usize,
    /// CORS allow-list; `None` permits any origin.
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl ApiOptions {
    /// Derive router options from the runtime configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes,
            cors_allowed_origins: config.cors_allowed_origins.clone(),
        }
    }
}

impl Default for ApiOptions {
    fn default() -> Self {
        Self {
            max_upload_bytes: 25 * 1024 * 1024,
            cors_allowed_origins: None,
        }
    }
}

/// Build the HTTP router exposing the upload and question API surface.
pub fn create_router<S>(service: Arc<S>, options: &ApiOptions) -> Router
where
    S: DocumentApi + 'static,
{
    Router::new()
        .route("/", get(home))
        .route("/upload", post(upload_document::<S>))
        .route("/ask", post(ask_question::<S>))
        .route("/status", get(get_status::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(options.max_upload_bytes))
        .layer(cors_layer(options.cors_allowed_origins.as_deref()))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

fn cors_layer(allowed_origins: Option<&[String]>) -> CorsLayer {
    let origin = match allowed_origins {
        Some(origins) => AllowOrigin::list(origins.iter().filter_map(|origin| {
            let parsed = origin.parse::<HeaderValue>().ok();
            if parsed.is_none() {
                tracing::warn!(origin, "Ignoring invalid CORS origin");
            }
            parsed
        })),
        None => AllowOrigin::from(Any),
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

/// Friendly welcome message.
async fn home() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: WELCOME_MESSAGE.to_string(),
    })
}

/// Success response for `POST /upload`.
#[derive(Serialize)]
struct UploadResponse {
    message: String,
    document: DocumentStatus,
}

/// Accept a multipart upload and index it as the active document.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError>
where
    S: DocumentApi,
{
    let mut multipart = multipart.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Upload was not multipart");
        AppError::bad_request("No file uploaded")
    })?;

    let mut upload: Option<(String, Vec<u8>)> = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(error) => return Err(AppError::new(error.status(), error.body_text())),
        };
        if field.name() != Some("file") {
            continue;
        }
        // A `file` part without a filename is a plain form value, not an upload.
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|error| AppError::new(error.status(), error.body_text()))?;
        upload = Some((file_name, bytes.to_vec()));
        break;
    }

    let (file_name, bytes) = upload.ok_or_else(|| AppError::bad_request("No file uploaded"))?;
    if file_name.trim().is_empty() {
        return Err(AppError::bad_request("No file selected"));
    }

    tracing::info!(file = %file_name, size = bytes.len(), "Upload received");
    let document = service.ingest_document(&file_name, bytes).await?;
    Ok(Json(UploadResponse {
        message: format!("Document '{}' processed successfully!", document.file_name),
        document,
    }))
}

/// Request body for `POST /ask`.
#[derive(Deserialize)]
struct AskRequest {
    #[serde(default)]
    question: Option<String>,
}

/// Success response for `POST /ask`.
#[derive(Serialize)]
struct AskResponse {
    answer: String,
    sources: Vec<SourceRef>,
}

/// Answer a question about the active document.
async fn ask_question<S>(
    State(service): State<Arc<S>>,
    request: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, AppError>
where
    S: DocumentApi,
{
    if service.status().await.is_none() {
        return Err(ProcessingError::NoDocument.into());
    }

    let question = request
        .ok()
        .and_then(|Json(body)| body.question)
        .filter(|question| !question.trim().is_empty())
        .ok_or(ProcessingError::EmptyQuestion)?;

    let answer = service.answer_question(&question).await?;
    Ok(Json(AskResponse {
        answer: answer.answer,
        sources: answer.sources,
    }))
}

/// Response body for `GET /status`.
#[derive(Serialize)]
struct StatusResponse {
    document: Option<DocumentStatus>,
}

async fn get_status<S>(State(service): State<Arc<S>>) -> Json<StatusResponse>
where
    S: DocumentApi,
{
    Json(StatusResponse {
        document: service.status().await,
    })
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<serde_json::Value>
where
    S: DocumentApi,
{
    Json(json!(service.metrics_snapshot()))
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery by clients.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "upload",
                method: "POST",
                path: "/upload",
                description: "Upload a PDF as multipart/form-data field `file`. The document is chunked, embedded, and indexed, replacing the previously active document.",
                request_example: None,
            },
            CommandDescriptor {
                name: "ask",
                method: "POST",
                path: "/ask",
                description: "Ask a question about the active document. Response returns { \"answer\": string, \"sources\": [{ \"chunk\": number, \"score\": number }] }.",
                request_example: Some(json!({ "question": "What is this document about?" })),
            },
            CommandDescriptor {
                name: "status",
                method: "GET",
                path: "/status",
                description: "Return metadata for the active document, or null when nothing is indexed.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return upload and question counters.",
                request_example: None,
            },
        ],
    })
}

/// Error rendered as `{"error": "..."}` with a matching status code.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<ProcessingError> for AppError {
    fn from(error: ProcessingError) -> Self {
        let status = match &error {
            ProcessingError::NoDocument | ProcessingError::EmptyQuestion => StatusCode::BAD_REQUEST,
            ProcessingError::Document(
                DocumentError::InvalidFileName(_)
                | DocumentError::EmptyUpload(_)
                | DocumentError::UnsupportedType(_),
            ) => StatusCode::BAD_REQUEST,
            ProcessingError::Document(DocumentError::NoText(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %error, "Request failed");
        }
        Self::new(status, error.to_string())
    }
}
