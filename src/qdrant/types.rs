//! Shared types used by the Qdrant client and helpers.

use crate::extraction::ElementKind;
use crate::resilience::Retryable;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while interacting with Qdrant.
#[derive(Debug, Error)]
pub enum QdrantError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Qdrant responded with an unexpected status code.
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Qdrant.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

impl Retryable for QdrantError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidUrl(_) => false,
            Self::Http(error) => error.is_connect() || error.is_timeout(),
            Self::UnexpectedStatus { status, .. } => status.is_server_error(),
        }
    }
}

/// Connection settings for a Qdrant instance.
#[derive(Debug, Clone)]
pub struct QdrantSettings {
    /// Base URL, e.g. `http://127.0.0.1:6333`.
    pub url: String,
    /// Optional API key sent in the `api-key` header.
    pub api_key: Option<String>,
}

/// Summary vector ready for upsert, keyed by the element identifier.
#[derive(Debug, Clone)]
pub struct SummaryPoint {
    /// Element identifier shared with the document store.
    pub id: String,
    /// Kind of the summarized element.
    pub kind: ElementKind,
    /// Summary text.
    pub text: String,
    /// Source document of the element.
    pub source: String,
    /// Page of the element, when known.
    pub page_number: Option<u32>,
    /// Embedding of `text`.
    pub vector: Vec<f32>,
}

/// Scored payload returned by Qdrant queries.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    /// Identifier assigned to the vector.
    pub id: String,
    /// Similarity score computed by Qdrant.
    pub score: f32,
    /// Optional payload associated with the vector.
    pub payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
pub(crate) struct QueryPoint {
    pub(crate) id: Value,
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
pub(crate) struct CountResponse {
    pub(crate) result: CountResult,
}

#[derive(Deserialize)]
pub(crate) struct CountResult {
    pub(crate) count: usize,
}
