//! Semantic index over summary text.
//!
//! The index itself is Qdrant; this module only embeds summaries and questions and maps the
//! stored payloads back to [`ElementId`]s and kind tags.

use super::ElementId;
use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::extraction::ElementKind;
use crate::qdrant::{QdrantError, QdrantService, SummaryPoint, read_payload};
use crate::resilience::{CallError, CallPolicy, call_with_policy};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

/// One summary to index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Identifier shared with the document store.
    pub id: ElementId,
    /// Kind of the summarized element.
    pub kind: ElementKind,
    /// Non-empty summary text.
    pub summary: String,
    /// Source document of the element.
    pub source: String,
    /// Page of the element, when known.
    pub page_number: Option<u32>,
}

/// One ranked match.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    /// Identifier of the matched element.
    pub id: ElementId,
    /// Kind tag recorded at ingestion time.
    pub kind: Option<ElementKind>,
    /// Matched summary text.
    pub summary: String,
    /// Similarity score (higher is closer).
    pub score: f32,
}

/// Failure writing to (or resetting) the index.
#[derive(Debug, Error)]
pub enum IndexWriteError {
    /// Summaries could not be embedded.
    #[error("Embedding summaries failed: {0}")]
    Embedding(#[source] EmbeddingClientError),
    /// The vector store rejected the write.
    #[error("Vector store write failed: {0}")]
    Store(#[source] QdrantError),
    /// A collaborator call exceeded its timeout.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that timed out.
        operation: &'static str,
        /// Applied timeout.
        after: Duration,
    },
}

/// Failure querying the index.
#[derive(Debug, Error)]
pub enum IndexQueryError {
    /// The question could not be embedded.
    #[error("Embedding the question failed: {0}")]
    Embedding(#[source] EmbeddingClientError),
    /// The vector store query failed.
    #[error("Vector store query failed: {0}")]
    Store(#[source] QdrantError),
    /// A collaborator call exceeded its timeout.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that timed out.
        operation: &'static str,
        /// Applied timeout.
        after: Duration,
    },
}

impl From<CallError<EmbeddingClientError>> for IndexWriteError {
    fn from(error: CallError<EmbeddingClientError>) -> Self {
        match error {
            CallError::Timeout { operation, after } => Self::Timeout { operation, after },
            CallError::Failed(inner) => Self::Embedding(inner),
        }
    }
}

impl From<CallError<QdrantError>> for IndexWriteError {
    fn from(error: CallError<QdrantError>) -> Self {
        match error {
            CallError::Timeout { operation, after } => Self::Timeout { operation, after },
            CallError::Failed(inner) => Self::Store(inner),
        }
    }
}

impl From<CallError<EmbeddingClientError>> for IndexQueryError {
    fn from(error: CallError<EmbeddingClientError>) -> Self {
        match error {
            CallError::Timeout { operation, after } => Self::Timeout { operation, after },
            CallError::Failed(inner) => Self::Embedding(inner),
        }
    }
}

impl From<CallError<QdrantError>> for IndexQueryError {
    fn from(error: CallError<QdrantError>) -> Self {
        match error {
            CallError::Timeout { operation, after } => Self::Timeout { operation, after },
            CallError::Failed(inner) => Self::Store(inner),
        }
    }
}

/// Vector index capability over summaries.
#[async_trait]
pub trait SummaryIndex: Send + Sync {
    /// Insert or replace entries; returns how many were written.
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<usize, IndexWriteError>;

    /// Top-`k` entries by descending similarity to `text`.
    async fn query(&self, text: &str, k: usize) -> Result<Vec<IndexHit>, IndexQueryError>;

    /// Drop every entry.
    async fn reset(&self) -> Result<(), IndexWriteError>;
}

/// [`SummaryIndex`] backed by a Qdrant collection.
pub struct QdrantSummaryIndex {
    embedder: Arc<dyn EmbeddingClient>,
    qdrant: QdrantService,
    collection: String,
    policy: CallPolicy,
    collection_ready: AtomicBool,
}

impl QdrantSummaryIndex {
    /// Index stored in `collection`, embedding text with `embedder`.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        qdrant: QdrantService,
        collection: impl Into<String>,
        policy: CallPolicy,
    ) -> Self {
        Self {
            embedder,
            qdrant,
            collection: collection.into(),
            policy,
            collection_ready: AtomicBool::new(false),
        }
    }

    /// Name of the backing collection.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Number of indexed summaries.
    pub async fn count(&self) -> Result<usize, IndexQueryError> {
        let count = call_with_policy(&self.policy, "qdrant count", || {
            self.qdrant.count_points(&self.collection)
        })
        .await?;
        Ok(count)
    }

    async fn ensure_collection(&self) -> Result<(), IndexWriteError> {
        if self.collection_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        let size = self.embedder.dimension() as u64;
        call_with_policy(&self.policy, "qdrant ensure collection", || {
            self.qdrant
                .create_collection_if_not_exists(&self.collection, size)
        })
        .await?;
        self.collection_ready.store(true, Ordering::Release);
        Ok(())
    }

    async fn embed<E>(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, E>
    where
        E: From<CallError<EmbeddingClientError>>,
    {
        let vectors = call_with_policy(&self.policy, "embed", || {
            self.embedder.generate_embeddings(texts.clone())
        })
        .await?;
        Ok(vectors)
    }
}

#[async_trait]
impl SummaryIndex for QdrantSummaryIndex {
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<usize, IndexWriteError> {
        if entries.is_empty() {
            return Ok(0);
        }
        self.ensure_collection().await?;

        let texts: Vec<String> = entries.iter().map(|entry| entry.summary.clone()).collect();
        let vectors: Vec<Vec<f32>> = self.embed::<IndexWriteError>(texts).await?;
        if vectors.len() != entries.len() {
            return Err(IndexWriteError::Embedding(
                EmbeddingClientError::GenerationFailed(format!(
                    "expected {} vectors, received {}",
                    entries.len(),
                    vectors.len()
                )),
            ));
        }

        let points: Vec<SummaryPoint> = entries
            .into_iter()
            .zip(vectors)
            .map(|(entry, vector)| SummaryPoint {
                id: entry.id.to_string(),
                kind: entry.kind,
                text: entry.summary,
                source: entry.source,
                page_number: entry.page_number,
                vector,
            })
            .collect();

        let written = call_with_policy(&self.policy, "qdrant upsert", || {
            self.qdrant.upsert_points(&self.collection, &points)
        })
        .await?;
        Ok(written)
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<IndexHit>, IndexQueryError> {
        if k == 0 || text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let mut vectors: Vec<Vec<f32>> =
            self.embed::<IndexQueryError>(vec![text.to_string()]).await?;
        let Some(vector) = vectors.pop() else {
            return Ok(Vec::new());
        };

        let points = call_with_policy(&self.policy, "qdrant query", || {
            self.qdrant.search_points(&self.collection, vector.clone(), k)
        })
        .await?;

        let hits = points
            .into_iter()
            .filter_map(|point| {
                let payload = read_payload(&point.id, point.payload.as_ref());
                match payload.element_id.parse::<ElementId>() {
                    Ok(id) => Some(IndexHit {
                        id,
                        kind: payload.kind,
                        summary: payload.text,
                        score: point.score,
                    }),
                    Err(_) => {
                        tracing::warn!(
                            point = %point.id,
                            "Ignoring indexed point without an element identifier"
                        );
                        None
                    }
                }
            })
            .collect();
        Ok(hits)
    }

    async fn reset(&self) -> Result<(), IndexWriteError> {
        call_with_policy(&self.policy, "qdrant delete collection", || {
            self.qdrant.delete_collection(&self.collection)
        })
        .await?;
        self.collection_ready.store(false, Ordering::Release);
        Ok(())
    }
}
