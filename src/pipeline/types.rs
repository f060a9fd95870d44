//! Shared request, report, and error types for the orchestrators.

use crate::extraction::{Element, ElementKind, ExtractionError};
use crate::llm::LlmError;
use crate::store::{BucketOutcome, ElementId, IndexQueryError};
use crate::summarization::SummarizationError;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// A document that was rejected during a multi-document ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentFailure {
    /// Document identifier.
    pub source: String,
    /// Rejection reason.
    pub error: String,
}

/// Outcome of one ingestion call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Text summaries produced (including blank ones).
    pub text_count: usize,
    /// Table summaries produced (including blank ones).
    pub table_count: usize,
    /// Image descriptions produced (including blank ones).
    pub image_count: usize,
    /// Documents extracted successfully.
    pub documents: usize,
    /// Documents rejected by the extractor.
    pub failed_documents: Vec<DocumentFailure>,
    /// Top-level elements that fit no bucket.
    pub unrecognized: usize,
    /// Registration outcome of the text bucket.
    pub texts: BucketOutcome,
    /// Registration outcome of the table bucket.
    pub tables: BucketOutcome,
    /// Registration outcome of the image bucket.
    pub images: BucketOutcome,
}

impl IngestReport {
    /// Summaries written to the index across all buckets.
    pub fn indexed(&self) -> usize {
        self.texts.indexed + self.tables.indexed + self.images.indexed
    }

    /// Elements written to the document store across all buckets.
    pub fn stored(&self) -> usize {
        self.texts.stored + self.tables.stored + self.images.stored
    }

    /// Buckets whose store or index write failed, with the failure message.
    pub fn bucket_failures(&self) -> Vec<(ElementKind, &str)> {
        [
            (ElementKind::Text, &self.texts),
            (ElementKind::Table, &self.tables),
            (ElementKind::Image, &self.images),
        ]
        .into_iter()
        .filter_map(|(kind, outcome)| outcome.failure.as_deref().map(|message| (kind, message)))
        .collect()
    }
}

/// Failures that abort an ingestion call.
#[derive(Debug, Error)]
pub enum IngestError {
    /// No input documents were supplied.
    #[error("No documents to ingest")]
    NoDocuments,
    /// The extractor rejected the input (every document, when several were given).
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// The summarizer was unreachable for an entire batch.
    #[error(transparent)]
    Summarization(#[from] SummarizationError),
}

/// One retrieved element with the summary that matched.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedElement {
    /// Identifier shared by the summary and the stored element.
    pub id: ElementId,
    /// Kind tag carried from ingestion.
    pub kind: ElementKind,
    /// Summary that matched the question.
    pub summary: String,
    /// Similarity score reported by the index.
    pub score: f32,
    /// 1-based rank in descending similarity.
    pub rank: usize,
    /// Original element from the document store.
    pub element: Element,
}

/// Which path produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerPath {
    /// Canned greeting; nothing was retrieved or generated.
    Greeting,
    /// No usable context; the model answered from its own knowledge.
    ZeroShot,
    /// The model answered from retrieved context.
    Grounded,
    /// An internal error was converted into an apology.
    Degraded,
}

/// User-facing answer plus the grounding used to produce it.
#[derive(Debug, Clone)]
pub struct Answer {
    /// Reply text; never empty.
    pub text: String,
    /// Path taken.
    pub path: AnswerPath,
    /// Elements used as context (empty unless grounded).
    pub sources: Vec<RetrievedElement>,
}

/// Internal answering failures; never returned to callers of `answer`.
#[derive(Debug, Error)]
pub enum AnswerError {
    /// Summary index query failed.
    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] IndexQueryError),
    /// Language model call failed.
    #[error("Language model failed: {0}")]
    Llm(#[source] LlmError),
    /// Language model call exceeded its timeout.
    #[error("Language model timed out after {0:?}")]
    Timeout(Duration),
}
