//! Process-wide service combining both orchestrators, shared by the HTTP API and the console.

use super::answer::AnsweringOrchestrator;
use super::ingest::IngestionOrchestrator;
use super::types::{Answer, IngestError, IngestReport};
use crate::config::Config;
use crate::embedding::{EmbeddingClientError, build_embedding_client};
use crate::extraction::{DocumentSource, ExtractorBuildError, build_extractor};
use crate::llm::{LlmError, build_language_model};
use crate::metrics::{MetricsSnapshot, RagMetrics};
use crate::qdrant::{QdrantError, QdrantService, QdrantSettings};
use crate::store::{DocumentStore, QdrantSummaryIndex, RagContext, ResetError, StoreError};
use crate::summarization::build_summarizer;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Abstraction over the RAG pipeline used by external surfaces (HTTP, console).
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Extract, summarize, and register the given documents.
    async fn ingest(&self, sources: Vec<DocumentSource>) -> Result<IngestReport, IngestError>;

    /// Answer a question; never fails.
    async fn ask(&self, question: &str) -> Answer;

    /// Remove every stored element and indexed summary.
    async fn reset(&self) -> Result<(), ResetError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Failures while wiring the service from configuration.
#[derive(Debug, Error)]
pub enum ServiceBuildError {
    /// Extractor adapter could not be built.
    #[error(transparent)]
    Extractor(#[from] ExtractorBuildError),
    /// Summarizer HTTP client could not be built.
    #[error("Failed to build summarizer client: {0}")]
    Summarizer(#[from] reqwest::Error),
    /// Answering model could not be built.
    #[error(transparent)]
    Llm(#[from] LlmError),
    /// Embedding client could not be built.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Qdrant client could not be built.
    #[error(transparent)]
    Qdrant(#[from] QdrantError),
    /// Persisted document store could not be opened.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Owns the orchestrators, their shared context, and the metrics registry.
///
/// Construct once near process start and share through an `Arc`.
pub struct RagService {
    ingestion: IngestionOrchestrator,
    answering: AnsweringOrchestrator,
    context: Arc<RagContext>,
    metrics: Arc<RagMetrics>,
}

impl RagService {
    /// Assemble a service from already-built orchestrators over the same context.
    pub fn new(
        ingestion: IngestionOrchestrator,
        answering: AnsweringOrchestrator,
        context: Arc<RagContext>,
    ) -> Self {
        Self {
            ingestion,
            answering,
            context,
            metrics: Arc::new(RagMetrics::new()),
        }
    }

    /// Build every collaborator from configuration and open the persisted document store.
    pub async fn from_config(config: &Config) -> Result<Self, ServiceBuildError> {
        let policy = config.call_policy();

        let store = DocumentStore::open(config.data_dir.join("docstore")).await?;
        let embedder = build_embedding_client(config)?;
        let qdrant = QdrantService::new(&QdrantSettings {
            url: config.qdrant_url.clone(),
            api_key: config.qdrant_api_key.clone(),
        })?;
        let index = QdrantSummaryIndex::new(
            Arc::from(embedder),
            qdrant,
            config.qdrant_collection_name.clone(),
            policy,
        );
        let context = Arc::new(RagContext::new(store, Arc::new(index)));

        let extractor = build_extractor(config)?;
        tracing::info!(extractor = extractor.name(), "Extractor ready");
        let ingestion = IngestionOrchestrator::new(
            Arc::from(extractor),
            build_summarizer(config)?,
            context.clone(),
            policy,
        );

        let llm = build_language_model(config)?;
        tracing::info!(
            model = llm.model(),
            multimodal = llm.supports_images(),
            "Language model ready"
        );
        let answering = AnsweringOrchestrator::new(
            Arc::from(llm),
            context.clone(),
            config.retrieval_top_k,
            policy,
        );

        Ok(Self::new(ingestion, answering, context))
    }

    /// Shared store and index.
    pub fn context(&self) -> &Arc<RagContext> {
        &self.context
    }

    /// Answering orchestrator, for callers that need retrieval details.
    pub fn answering(&self) -> &AnsweringOrchestrator {
        &self.answering
    }
}

#[async_trait]
impl RagApi for RagService {
    async fn ingest(&self, sources: Vec<DocumentSource>) -> Result<IngestReport, IngestError> {
        let report = self.ingestion.ingest(&sources).await?;
        self.metrics.record_ingestion(
            report.documents as u64,
            report.stored() as u64,
            report.indexed() as u64,
        );
        Ok(report)
    }

    async fn ask(&self, question: &str) -> Answer {
        let answer = self.answering.respond(question).await;
        self.metrics.record_question();
        answer
    }

    async fn reset(&self) -> Result<(), ResetError> {
        self.context.reset().await?;
        self.metrics.clear_storage();
        Ok(())
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
