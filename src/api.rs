//! HTTP surface for the multimodal RAG service.
//!
//! This module exposes a compact Axum router:
//!
//! - `POST /ingest` – Multipart upload of one or more PDFs (any field name, one file per
//!   field). Returns the ingestion report with per-bucket counts and failures.
//! - `POST /ask` – `{ "query": "..." }` in, `{ "answer": "...", "path": ..., "sources": [...] }`
//!   out. Answering never fails; internal errors surface as an apology in `answer`.
//! - `POST /reset` – Drop every stored element and indexed summary.
//! - `GET /metrics` – Ingestion and answering counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.

use crate::extraction::{DocumentSource, ElementKind, ExtractionError};
use crate::pipeline::{AnswerPath, IngestError, IngestReport, RagApi};
use crate::store::ResetError;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Build the HTTP router exposing ingestion and question answering.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: RagApi + 'static,
{
    Router::new()
        .route("/ingest", post(ingest_documents::<S>))
        .route("/ask", post(ask_question::<S>))
        .route("/reset", post(reset_state::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(service)
}

/// Ingest every uploaded file as one batch.
async fn ingest_documents<S>(
    State(service): State<Arc<S>>,
    mut multipart: Multipart,
) -> Result<Json<IngestReport>, AppError>
where
    S: RagApi,
{
    let mut sources = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| AppError::BadRequest(error.body_text()))?
    {
        let name = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|error| AppError::BadRequest(error.body_text()))?;
        if data.is_empty() {
            continue;
        }
        sources.push(DocumentSource::Bytes {
            name,
            data: data.to_vec(),
        });
    }
    tracing::info!(files = sources.len(), "Ingest request received");

    let report = service.ingest(sources).await?;
    Ok(Json(report))
}

/// Request body for `POST /ask`.
#[derive(Deserialize)]
struct AskRequest {
    /// Question text.
    query: String,
}

/// One grounding element in the `POST /ask` response.
#[derive(Serialize)]
struct SourceView {
    id: String,
    kind: ElementKind,
    source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_number: Option<u32>,
    score: f32,
    summary: String,
}

/// Response body for `POST /ask`.
#[derive(Serialize)]
struct AskResponse {
    answer: String,
    path: AnswerPath,
    sources: Vec<SourceView>,
}

/// Answer a question against the ingested documents.
async fn ask_question<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<AskRequest>,
) -> Json<AskResponse>
where
    S: RagApi,
{
    let answer = service.ask(&request.query).await;
    tracing::info!(path = ?answer.path, sources = answer.sources.len(), "Ask request completed");
    Json(AskResponse {
        answer: answer.text,
        path: answer.path,
        sources: answer
            .sources
            .into_iter()
            .map(|retrieved| SourceView {
                id: retrieved.id.to_string(),
                kind: retrieved.kind,
                source: retrieved.element.provenance().source.clone(),
                page_number: retrieved.element.provenance().page_number,
                score: retrieved.score,
                summary: retrieved.summary,
            })
            .collect(),
    })
}

/// Drop all persisted state.
async fn reset_state<S>(State(service): State<Arc<S>>) -> Result<Json<serde_json::Value>, AppError>
where
    S: RagApi,
{
    service.reset().await?;
    Ok(Json(json!({ "status": "reset" })))
}

/// Return the current counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<crate::metrics::MetricsSnapshot>
where
    S: RagApi,
{
    Json(service.metrics_snapshot())
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

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "ingest",
                method: "POST",
                path: "/ingest",
                description: "Upload PDFs as multipart/form-data. Text, tables, and images are summarized and indexed; the response reports counts per bucket.",
                request_example: None,
            },
            CommandDescriptor {
                name: "ask",
                method: "POST",
                path: "/ask",
                description: "Answer a question from the ingested documents. Response returns { \"answer\": string, \"path\": string, \"sources\": [...] }.",
                request_example: Some(json!({ "query": "What does the revenue chart show?" })),
            },
            CommandDescriptor {
                name: "reset",
                method: "POST",
                path: "/reset",
                description: "Delete every stored element and drop the summary collection.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return ingestion and answering counters.",
                request_example: None,
            },
        ],
    })
}

enum AppError {
    BadRequest(String),
    Ingest(IngestError),
    Reset(ResetError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) | Self::Ingest(IngestError::NoDocuments) => StatusCode::BAD_REQUEST,
            Self::Ingest(IngestError::Extraction(
                ExtractionError::UnsupportedInput { .. } | ExtractionError::Corrupt { .. },
            )) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Ingest(IngestError::Summarization(_))
            | Self::Ingest(IngestError::Extraction(
                ExtractionError::Service { .. } | ExtractionError::Timeout { .. },
            )) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Ingest(_) | Self::Reset(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match self {
            Self::BadRequest(message) => message,
            Self::Ingest(error) => error.to_string(),
            Self::Reset(error) => error.to_string(),
        };
        tracing::warn!(status = status.as_u16(), error = %message, "Request failed");
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<IngestError> for AppError {
    fn from(inner: IngestError) -> Self {
        Self::Ingest(inner)
    }
}

impl From<ResetError> for AppError {
    fn from(inner: ResetError) -> Self {
        Self::Reset(inner)
    }
}
