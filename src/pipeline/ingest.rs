//! Ingestion: extract, classify, summarize, then register each bucket.

use super::types::{DocumentFailure, IngestError, IngestReport};
use crate::classify::{classify, extract_images};
use crate::extraction::{DocumentSource, Element, ElementKind, ExtractionError, Extractor};
use crate::resilience::{CallError, CallPolicy, call_with_policy};
use crate::store::RagContext;
use crate::summarization::Summarizer;
use std::sync::Arc;

/// Turns documents into stored elements and indexed summaries.
pub struct IngestionOrchestrator {
    extractor: Arc<dyn Extractor>,
    summarizer: Summarizer,
    context: Arc<RagContext>,
    policy: CallPolicy,
}

impl IngestionOrchestrator {
    /// Wire the collaborators; `policy` bounds each extraction call.
    pub fn new(
        extractor: Arc<dyn Extractor>,
        summarizer: Summarizer,
        context: Arc<RagContext>,
        policy: CallPolicy,
    ) -> Self {
        Self {
            extractor,
            summarizer,
            context,
            policy,
        }
    }

    /// Ingest `sources` as one batch.
    ///
    /// A single rejected document fails the call. With several documents, rejected ones are
    /// recorded in the report and the rest continue; the call fails only when all of them are
    /// rejected.
    pub async fn ingest(&self, sources: &[DocumentSource]) -> Result<IngestReport, IngestError> {
        if sources.is_empty() {
            return Err(IngestError::NoDocuments);
        }

        let mut report = IngestReport::default();
        let mut elements = Vec::new();
        let mut first_error = None;
        for source in sources {
            match self.extract(source).await {
                Ok(extracted) => {
                    tracing::info!(
                        source = %source.display_name(),
                        extractor = self.extractor.name(),
                        elements = extracted.len(),
                        "Document extracted"
                    );
                    report.documents += 1;
                    elements.extend(extracted);
                }
                Err(error) if sources.len() == 1 => return Err(error.into()),
                Err(error) => {
                    tracing::warn!(
                        source = %source.display_name(),
                        error = %error,
                        "Document rejected; continuing with the rest"
                    );
                    report.failed_documents.push(DocumentFailure {
                        source: source.display_name(),
                        error: error.to_string(),
                    });
                    first_error.get_or_insert(error);
                }
            }
        }
        if report.documents == 0
            && let Some(error) = first_error
        {
            return Err(error.into());
        }

        let classified = classify(elements);
        report.unrecognized = classified.unrecognized.len();
        let images = extract_images(&classified.texts);

        let (text_summaries, table_summaries) =
            self.summarize_text_and_tables(&classified.texts, &classified.tables)
                .await?;
        let image_summaries = self.summarizer.summarize_images(&images).await?;
        report.text_count = text_summaries.len();
        report.table_count = table_summaries.len();
        report.image_count = image_summaries.len();

        report.texts = self
            .context
            .register_bucket(ElementKind::Text, classified.texts, text_summaries)
            .await;
        report.tables = self
            .context
            .register_bucket(ElementKind::Table, classified.tables, table_summaries)
            .await;
        report.images = self
            .context
            .register_bucket(ElementKind::Image, images, image_summaries)
            .await;

        tracing::info!(
            documents = report.documents,
            failed = report.failed_documents.len(),
            texts = report.text_count,
            tables = report.table_count,
            images = report.image_count,
            stored = report.stored(),
            indexed = report.indexed(),
            "Ingestion finished"
        );
        Ok(report)
    }

    async fn extract(&self, source: &DocumentSource) -> Result<Vec<Element>, ExtractionError> {
        let extractor = self.extractor.as_ref();
        call_with_policy(&self.policy, "extract", || extractor.extract(source))
            .await
            .map_err(|error| match error {
                CallError::Timeout { .. } => ExtractionError::Timeout {
                    source_name: source.display_name(),
                },
                CallError::Failed(inner) => inner,
            })
    }

    // Texts and tables share one batch so the concurrency cap spans both.
    async fn summarize_text_and_tables(
        &self,
        texts: &[Element],
        tables: &[Element],
    ) -> Result<(Vec<String>, Vec<String>), IngestError> {
        let combined: Vec<Element> = texts.iter().chain(tables).cloned().collect();
        let mut summaries = self.summarizer.summarize_elements(&combined).await?;
        let table_summaries = summaries.split_off(texts.len().min(summaries.len()));
        Ok((summaries, table_summaries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::Provenance;
    use crate::store::{
        DocumentStore, IndexEntry, IndexHit, IndexQueryError, IndexWriteError, SummaryIndex,
    };
    use crate::summarization::{
        SummarizationClient, SummarizationClientError, SummarizationRequest, SummarizerSettings,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Extractor keyed by document name; unknown names are rejected as non-PDF.
    struct MapExtractor {
        documents: HashMap<String, Vec<Element>>,
    }

    #[async_trait]
    impl Extractor for MapExtractor {
        async fn extract(&self, source: &DocumentSource) -> Result<Vec<Element>, ExtractionError> {
            let name = source.display_name();
            self.documents
                .get(&name)
                .cloned()
                .ok_or(ExtractionError::UnsupportedInput {
                    source_name: name,
                    reason: "not a PDF".into(),
                })
        }

        fn name(&self) -> &str {
            "map"
        }
    }

    /// Summarizes by echoing a prefix of the prompt tail; blank for inputs containing "skip".
    struct EchoClient;

    #[async_trait]
    impl SummarizationClient for EchoClient {
        async fn generate_summary(
            &self,
            request: SummarizationRequest,
        ) -> Result<String, SummarizationClientError> {
            if !request.images.is_empty() {
                return Ok("an image".into());
            }
            let input = request.prompt.rsplit("Input: ").next().unwrap_or_default();
            if input.contains("skip") {
                return Ok("   ".into());
            }
            Ok(format!("summary of {input}"))
        }
    }

    struct DownClient;

    #[async_trait]
    impl SummarizationClient for DownClient {
        async fn generate_summary(
            &self,
            _request: SummarizationRequest,
        ) -> Result<String, SummarizationClientError> {
            Err(SummarizationClientError::ProviderUnavailable(
                "connection refused".into(),
            ))
        }
    }

    #[derive(Default)]
    struct MemoryIndex {
        entries: Mutex<Vec<IndexEntry>>,
    }

    #[async_trait]
    impl SummaryIndex for MemoryIndex {
        async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<usize, IndexWriteError> {
            let count = entries.len();
            self.entries.lock().expect("lock").extend(entries);
            Ok(count)
        }

        async fn query(&self, _text: &str, _k: usize) -> Result<Vec<IndexHit>, IndexQueryError> {
            Ok(Vec::new())
        }

        async fn reset(&self) -> Result<(), IndexWriteError> {
            self.entries.lock().expect("lock").clear();
            Ok(())
        }
    }

    fn origin(source: &str) -> Provenance {
        Provenance {
            source: source.into(),
            page_number: Some(1),
        }
    }

    fn named(name: &str) -> DocumentSource {
        DocumentSource::Bytes {
            name: Some(name.into()),
            data: b"%PDF-1.7".to_vec(),
        }
    }

    type Fixture = (IngestionOrchestrator, Arc<RagContext>, Arc<MemoryIndex>);

    fn orchestrator(
        documents: Vec<(&str, Vec<Element>)>,
        client: Arc<dyn SummarizationClient>,
    ) -> Fixture {
        let index = Arc::new(MemoryIndex::default());
        let context = Arc::new(RagContext::new(DocumentStore::in_memory(), index.clone()));
        let extractor = MapExtractor {
            documents: documents
                .into_iter()
                .map(|(name, elements)| (name.to_string(), elements))
                .collect(),
        };
        let summarizer = Summarizer::new(
            client,
            SummarizerSettings {
                text_model: "gemma:2b".into(),
                image_model: "llava".into(),
                temperature: 0.5,
                max_concurrency: 2,
                policy: CallPolicy::no_retry(Duration::from_secs(5)),
            },
        );
        let orchestrator = IngestionOrchestrator::new(
            Arc::new(extractor),
            summarizer,
            context.clone(),
            CallPolicy::no_retry(Duration::from_secs(5)),
        );
        (orchestrator, context, index)
    }

    fn report_doc() -> Vec<Element> {
        vec![
            Element::text("Revenue grew in the third quarter.", origin("report.pdf")).with_nested(
                vec![Element::image("image/jpeg", b"\xff\xd8jpeg", origin("report.pdf"))],
            ),
            Element::table(
                "Q3 | 12",
                Some("<table><tr><td>Q3</td></tr></table>".into()),
                origin("report.pdf"),
            ),
            Element::text("skip this one", origin("report.pdf")),
        ]
    }

    #[tokio::test]
    async fn every_indexed_summary_resolves_in_the_store() {
        let (orchestrator, context, index) =
            orchestrator(vec![("report.pdf", report_doc())], Arc::new(EchoClient));

        let report = orchestrator.ingest(&[named("report.pdf")]).await.expect("ingest");

        assert_eq!(report.documents, 1);
        assert_eq!(report.text_count, 2);
        assert_eq!(report.table_count, 1);
        assert_eq!(report.image_count, 1);
        assert_eq!(report.texts.dropped_empty, 1);
        assert_eq!(report.stored(), 4);
        assert_eq!(report.indexed(), 3);
        assert!(report.bucket_failures().is_empty());

        let entries = index.entries.lock().expect("lock").clone();
        assert_eq!(entries.len(), 3);
        for entry in &entries {
            let element = context.store().get(&entry.id).await.expect("paired element");
            assert_eq!(element.kind(), entry.kind);
            assert!(!entry.summary.trim().is_empty());
        }
        let table = entries
            .iter()
            .find(|entry| entry.kind == ElementKind::Table)
            .expect("table entry");
        assert!(table.summary.contains("<table>"));
    }

    #[tokio::test]
    async fn multiple_documents_are_concatenated() {
        let (orchestrator, context, _) = orchestrator(
            vec![
                ("a.pdf", vec![Element::text("same words", origin("a.pdf"))]),
                ("b.pdf", vec![Element::text("same words", origin("b.pdf"))]),
            ],
            Arc::new(EchoClient),
        );

        let report = orchestrator
            .ingest(&[named("a.pdf"), named("b.pdf")])
            .await
            .expect("ingest");
        assert_eq!(report.documents, 2);
        assert_eq!(report.texts.stored, 2);
        assert_eq!(context.store().len().await, 2);
    }

    #[tokio::test]
    async fn single_rejected_document_propagates() {
        let (orchestrator, context, _) = orchestrator(Vec::new(), Arc::new(EchoClient));
        let error = orchestrator.ingest(&[named("notes.txt")]).await.unwrap_err();
        assert!(matches!(
            error,
            IngestError::Extraction(ExtractionError::UnsupportedInput { .. })
        ));
        assert!(context.store().is_empty().await);
    }

    #[tokio::test]
    async fn rejected_document_in_a_batch_is_recorded() {
        let (orchestrator, _, _) = orchestrator(
            vec![("good.pdf", vec![Element::text("content", origin("good.pdf"))])],
            Arc::new(EchoClient),
        );
        let report = orchestrator
            .ingest(&[named("bad.txt"), named("good.pdf")])
            .await
            .expect("ingest");
        assert_eq!(report.documents, 1);
        assert_eq!(report.failed_documents.len(), 1);
        assert_eq!(report.failed_documents[0].source, "bad.txt");

        let (orchestrator, _, _) = orchestrator_without_documents();
        let error = orchestrator
            .ingest(&[named("x.txt"), named("y.txt")])
            .await
            .unwrap_err();
        match error {
            IngestError::Extraction(ExtractionError::UnsupportedInput { source_name, .. }) => {
                assert_eq!(source_name, "x.txt");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    fn orchestrator_without_documents() -> Fixture {
        orchestrator(Vec::new(), Arc::new(EchoClient))
    }

    #[tokio::test]
    async fn unreachable_summarizer_fails_the_call() {
        let (orchestrator, context, _) =
            orchestrator(vec![("report.pdf", report_doc())], Arc::new(DownClient));
        let error = orchestrator.ingest(&[named("report.pdf")]).await.unwrap_err();
        assert!(matches!(error, IngestError::Summarization(_)));
        assert!(context.store().is_empty().await);
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let (orchestrator, _, _) = orchestrator_without_documents();
        assert!(matches!(
            orchestrator.ingest(&[]).await,
            Err(IngestError::NoDocuments)
        ));
    }
}
