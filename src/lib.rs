use std::sync::Arc;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::QueryRejection,
        DefaultBodyLimit, Multipart, Query, State,
    },
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod convert;
pub mod docx;
pub mod models;
pub mod spacing;

use config::Config;
use convert::{ConvertError, PdfConverter};
use docx::DocxError;
use models::{ErrorResponse, OutputFormat, ProcessQuery, DOCX_MEDIA_TYPE, PDF_MEDIA_TYPE};
use spacing::SpacingRules;

// ── Constants ────────────────────────────────────────────────────────────────

const UPLOAD_FIELD: &str = "file";
const DOCX_EXTENSION: &str = ".docx";
const OUTPUT_PREFIX: &str = "processed_";

const SPACERS_HEADER: &str = "x-spacers-inserted";

static UNSAFE_FILENAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[^\x20-\x7E]|["\\]"#).unwrap());

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Uploaded file is not a .docx file")]
    NotDocx,
    #[error("No file uploaded")]
    MissingFile,
    #[error("{0}")]
    Form(#[from] MultipartRejection),
    #[error("{0}")]
    Query(#[from] QueryRejection),
    #[error("{0}")]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Docx(#[from] DocxError),
    #[error(transparent)]
    Convert(#[from] ConvertError),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ProcessError {
    fn into_response(self) -> Response {
        let status = match &self {
            ProcessError::NotDocx
            | ProcessError::MissingFile
            | ProcessError::Form(_)
            | ProcessError::Query(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ProcessError::Multipart(e) => match e.status() {
                StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            },
            ProcessError::Docx(DocxError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ProcessError::Docx(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ProcessError::Convert(ConvertError::Unavailable { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ProcessError::Convert(ConvertError::Io(_)) | ProcessError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProcessError::Convert(_) => StatusCode::BAD_GATEWAY,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

// ── Router ───────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    rules: Arc<SpacingRules>,
    converter: PdfConverter,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            rules: Arc::new(config.rules.clone()),
            converter: PdfConverter::new(config.soffice.clone(), config.convert_timeout),
        }
    }
}

pub fn app(config: &Config) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/process-docx", post(process_docx_endpoint))
        .route("/process-docx/", post(process_docx_endpoint))
        .with_state(AppState::new(config))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

// ── Processing endpoint ──────────────────────────────────────────────────────

struct Upload {
    filename: String,
    data: Vec<u8>,
}

async fn process_docx_endpoint(
    State(state): State<AppState>,
    query: Result<Query<ProcessQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ProcessError> {
    let Query(query) = query?;
    let upload = read_upload(multipart?).await?;

    tracing::info!(
        filename = %upload.filename,
        size = upload.data.len(),
        output = ?query.output,
        "processing upload"
    );

    let rules = Arc::clone(&state.rules);
    let Upload { filename, data } = upload;
    let processed = tokio::task::spawn_blocking(move || docx::process_docx(&data, &rules))
        .await
        .map_err(|e| ProcessError::Internal(format!("processing task failed: {}", e)))??;

    tracing::info!(
        filename = %filename,
        paragraphs = processed.paragraphs,
        spacers = processed.spacers_inserted,
        "document processed"
    );

    let (body, media_type, download_name) = match query.output {
        OutputFormat::Docx => (
            processed.bytes,
            DOCX_MEDIA_TYPE,
            format!("{}{}", OUTPUT_PREFIX, filename),
        ),
        OutputFormat::Pdf => {
            let pdf = state.converter.docx_to_pdf(&processed.bytes).await?;
            let stem = &filename[..filename.len() - DOCX_EXTENSION.len()];
            (pdf, PDF_MEDIA_TYPE, format!("{}{}.pdf", OUTPUT_PREFIX, stem))
        }
    };

    Ok((
        [
            (header::CONTENT_TYPE, media_type.to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(&download_name)),
            (HeaderName::from_static(SPACERS_HEADER), processed.spacers_inserted.to_string()),
        ],
        body,
    )
        .into_response())
}

/// Pull the `file` field out of the form. The name is checked before the
/// body is read so that wrong uploads are rejected cheaply.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, ProcessError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field.file_name().map(base_name).unwrap_or_default();
        if !filename.ends_with(DOCX_EXTENSION) {
            return Err(ProcessError::NotDocx);
        }

        let data = field.bytes().await?.to_vec();
        return Ok(Upload { filename, data });
    }
    Err(ProcessError::MissingFile)
}

/// Strip any client-side directory components from an uploaded file name.
fn base_name(name: &str) -> String {
    name.rsplit(['/', '\\']).next().unwrap_or(name).to_string()
}

fn content_disposition(filename: &str) -> String {
    let fallback = UNSAFE_FILENAME_RE.replace_all(filename, "_");
    if fallback == filename {
        format!("attachment; filename=\"{}\"", filename)
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            urlencoding::encode(filename)
        )
    }
}
