//! Question answering over the registered elements.

use super::types::{Answer, AnswerError, AnswerPath, RetrievedElement};
use crate::extraction::{ElementKind, Payload};
use crate::llm::{LanguageModel, LlmError, PromptPart};
use crate::resilience::{CallError, CallPolicy, call_with_policy};
use crate::store::{ElementId, RagContext};
use std::sync::Arc;

/// Reply to a bare greeting.
pub const GREETING_REPLY: &str = "Hello! How can I help you today?";

/// Reply shown when answering failed internally.
pub const APOLOGY_REPLY: &str =
    "Sorry, I ran into a problem while answering your question. Please try again.";

const GREETINGS: [&str; 3] = ["hi", "hello", "hey"];

/// Answers questions by retrieving summaries and prompting a language model with the originals.
pub struct AnsweringOrchestrator {
    llm: Arc<dyn LanguageModel>,
    context: Arc<RagContext>,
    top_k: usize,
    policy: CallPolicy,
}

impl AnsweringOrchestrator {
    /// Wire the collaborators; `top_k` bounds retrieval, `policy` bounds each model call.
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        context: Arc<RagContext>,
        top_k: usize,
        policy: CallPolicy,
    ) -> Self {
        Self {
            llm,
            context,
            top_k,
            policy,
        }
    }

    /// Reply text for `question`. Never fails; internal errors become an apology.
    pub async fn answer(&self, question: &str) -> String {
        self.respond(question).await.text
    }

    /// Reply for `question` along with the path taken and the grounding used.
    pub async fn respond(&self, question: &str) -> Answer {
        if is_greeting(question) {
            return Answer {
                text: GREETING_REPLY.to_string(),
                path: AnswerPath::Greeting,
                sources: Vec::new(),
            };
        }

        match self.try_answer(question).await {
            Ok(answer) => answer,
            Err(error) => {
                tracing::error!(error = %error, "Answering failed");
                Answer {
                    text: APOLOGY_REPLY.to_string(),
                    path: AnswerPath::Degraded,
                    sources: Vec::new(),
                }
            }
        }
    }

    /// Top-`k` summaries for `question`, resolved to their stored elements.
    ///
    /// Hits whose identifier is missing from the store are skipped; ranks keep the index order.
    pub async fn retrieve(
        &self,
        question: &str,
        k: usize,
    ) -> Result<Vec<RetrievedElement>, AnswerError> {
        let hits = self.context.index().query(question, k).await?;
        let ids: Vec<ElementId> = hits.iter().map(|hit| hit.id).collect();
        let elements = self.context.store().get_many(&ids).await;

        let mut retrieved = Vec::with_capacity(hits.len());
        for (position, (hit, element)) in hits.into_iter().zip(elements).enumerate() {
            let Some(element) = element else {
                tracing::warn!(id = %hit.id, "Indexed summary has no stored element");
                continue;
            };
            retrieved.push(RetrievedElement {
                id: hit.id,
                kind: hit.kind.unwrap_or_else(|| element.kind()),
                summary: hit.summary,
                score: hit.score,
                rank: position + 1,
                element,
            });
        }
        tracing::debug!(k, retrieved = retrieved.len(), "Retrieved context");
        Ok(retrieved)
    }

    async fn try_answer(&self, question: &str) -> Result<Answer, AnswerError> {
        let sources: Vec<RetrievedElement> = self
            .retrieve(question, self.top_k)
            .await?
            .into_iter()
            .filter(|retrieved| retrieved.element.has_content())
            .collect();

        if sources.is_empty() {
            tracing::info!("No relevant content found; answering zero-shot");
            let text = self.complete(&[zero_shot_prompt(question)]).await?;
            return Ok(Answer {
                text,
                path: AnswerPath::ZeroShot,
                sources,
            });
        }

        let parts = grounded_prompt(question, &sources, self.llm.supports_images());
        tracing::info!(
            model = self.llm.model(),
            context = sources.len(),
            images = parts.len() - 1,
            "Answering from retrieved context"
        );
        let text = self.complete(&parts).await?;
        Ok(Answer {
            text,
            path: AnswerPath::Grounded,
            sources,
        })
    }

    async fn complete(&self, parts: &[PromptPart]) -> Result<String, AnswerError> {
        let llm = self.llm.as_ref();
        let reply = call_with_policy(&self.policy, "llm complete", || llm.complete(parts))
            .await
            .map_err(|error| match error {
                CallError::Timeout { after, .. } => AnswerError::Timeout(after),
                CallError::Failed(inner) => AnswerError::Llm(inner),
            })?;
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(AnswerError::Llm(LlmError::InvalidResponse(
                "model returned an empty reply".into(),
            )));
        }
        Ok(reply.to_string())
    }
}

fn is_greeting(question: &str) -> bool {
    let normalized = question.trim().to_lowercase();
    GREETINGS.contains(&normalized.as_str())
}

fn zero_shot_prompt(question: &str) -> PromptPart {
    PromptPart::text(format!(
        "Answer the question based on your knowledge. No relevant content found.\nQuestion: {question}"
    ))
}

/// Text prompt first, then one part per image when the model reads images.
fn grounded_prompt(
    question: &str,
    sources: &[RetrievedElement],
    supports_images: bool,
) -> Vec<PromptPart> {
    let mut context = Vec::new();
    let mut images = Vec::new();
    for source in sources {
        match (source.kind, source.element.payload()) {
            (
                ElementKind::Image,
                Payload::Image {
                    mime_type,
                    data_base64,
                },
            ) if supports_images => images.push(PromptPart::Image {
                mime_type: mime_type.clone(),
                data_base64: data_base64.clone(),
            }),
            (ElementKind::Image, _) => context.push(format!("[Image] {}", source.summary)),
            _ => context.push(source.element.summarization_input().trim().to_string()),
        }
    }

    let mut parts = vec![PromptPart::text(format!(
        "Answer the question based only on the given context.\nContext: {}\nQuestion: {question}",
        context.join("\n\n")
    ))];
    parts.extend(images);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{Element, Provenance};
    use crate::store::{
        DocumentStore, IndexEntry, IndexHit, IndexQueryError, IndexWriteError, SummaryIndex,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Returns every entry in insertion order, up to `k`.
    #[derive(Default)]
    struct ListIndex {
        entries: Mutex<Vec<IndexEntry>>,
        queries: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl SummaryIndex for ListIndex {
        async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<usize, IndexWriteError> {
            let count = entries.len();
            self.entries.lock().expect("lock").extend(entries);
            Ok(count)
        }

        async fn query(&self, _text: &str, k: usize) -> Result<Vec<IndexHit>, IndexQueryError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(IndexQueryError::Timeout {
                    operation: "qdrant query",
                    after: Duration::from_secs(1),
                });
            }
            Ok(self
                .entries
                .lock()
                .expect("lock")
                .iter()
                .take(k)
                .enumerate()
                .map(|(position, entry)| IndexHit {
                    id: entry.id,
                    kind: Some(entry.kind),
                    summary: entry.summary.clone(),
                    score: 1.0 - position as f32 * 0.1,
                })
                .collect())
        }

        async fn reset(&self) -> Result<(), IndexWriteError> {
            self.entries.lock().expect("lock").clear();
            Ok(())
        }
    }

    struct ScriptedLlm {
        reply: Result<&'static str, ()>,
        images: bool,
        prompts: Mutex<Vec<Vec<PromptPart>>>,
    }

    impl ScriptedLlm {
        fn replying(reply: &'static str, images: bool) -> Self {
            Self {
                reply: Ok(reply),
                images,
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(()),
                images: false,
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Vec<PromptPart>> {
            self.prompts.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedLlm {
        async fn complete(&self, parts: &[PromptPart]) -> Result<String, LlmError> {
            self.prompts.lock().expect("lock").push(parts.to_vec());
            self.reply
                .map(str::to_string)
                .map_err(|_| LlmError::RequestFailed("400: bad request".into()))
        }

        fn supports_images(&self) -> bool {
            self.images
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn origin() -> Provenance {
        Provenance {
            source: "doc.pdf".into(),
            page_number: Some(2),
        }
    }

    fn setup(
        index: ListIndex,
        llm: ScriptedLlm,
    ) -> (AnsweringOrchestrator, Arc<RagContext>, Arc<ListIndex>, Arc<ScriptedLlm>) {
        let index = Arc::new(index);
        let llm = Arc::new(llm);
        let context = Arc::new(RagContext::new(DocumentStore::in_memory(), index.clone()));
        let orchestrator = AnsweringOrchestrator::new(
            llm.clone(),
            context.clone(),
            3,
            CallPolicy::no_retry(Duration::from_secs(5)),
        );
        (orchestrator, context, index, llm)
    }

    fn text_part(parts: &[PromptPart]) -> &str {
        match &parts[0] {
            PromptPart::Text(text) => text,
            other => panic!("expected text part, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn greetings_skip_retrieval_and_generation() {
        let (orchestrator, _, index, llm) =
            setup(ListIndex::default(), ScriptedLlm::replying("unused", false));
        for greeting in ["hi", "  Hello ", "HEY"] {
            assert_eq!(orchestrator.answer(greeting).await, GREETING_REPLY);
        }
        assert_eq!(index.queries.load(Ordering::SeqCst), 0);
        assert!(llm.calls().is_empty());
        assert_ne!(orchestrator.respond("hi there").await.path, AnswerPath::Greeting);
    }

    #[tokio::test]
    async fn empty_store_answers_zero_shot() {
        let (orchestrator, _, _, llm) =
            setup(ListIndex::default(), ScriptedLlm::replying("Paris.", false));
        let answer = orchestrator.respond("What is the capital of France?").await;

        assert_eq!(answer.path, AnswerPath::ZeroShot);
        assert_eq!(answer.text, "Paris.");
        let calls = llm.calls();
        assert_eq!(calls.len(), 1);
        assert!(text_part(&calls[0]).contains("No relevant content found"));
        assert!(text_part(&calls[0]).contains("capital of France"));
    }

    #[tokio::test]
    async fn grounded_prompt_carries_text_and_table_content() {
        let (orchestrator, context, _, llm) =
            setup(ListIndex::default(), ScriptedLlm::replying("It grew 12%.", false));
        context
            .register_bucket(
                ElementKind::Text,
                vec![Element::text("Revenue grew 12% in Q3.", origin())],
                vec!["Revenue growth".into()],
            )
            .await;
        context
            .register_bucket(
                ElementKind::Table,
                vec![Element::table(
                    "Q3 12",
                    Some("<table><tr><td>Q3</td><td>12</td></tr></table>".into()),
                    origin(),
                )],
                vec!["Quarterly table".into()],
            )
            .await;

        let answer = orchestrator.respond("How much did revenue grow?").await;
        assert_eq!(answer.path, AnswerPath::Grounded);
        assert_eq!(answer.sources.len(), 2);
        assert_eq!(answer.sources[0].rank, 1);

        let calls = llm.calls();
        let prompt = text_part(&calls[0]);
        assert!(prompt.starts_with("Answer the question based only on the given context."));
        assert!(prompt.contains("Revenue grew 12% in Q3."));
        assert!(prompt.contains("<table>"));
        assert!(prompt.ends_with("Question: How much did revenue grow?"));
    }

    #[tokio::test]
    async fn images_are_attached_only_for_multimodal_models() {
        for images in [true, false] {
            let (orchestrator, context, _, llm) =
                setup(ListIndex::default(), ScriptedLlm::replying("A bar chart.", images));
            context
                .register_bucket(
                    ElementKind::Image,
                    vec![Element::image("image/jpeg", b"\xff\xd8chart", origin())],
                    vec!["Bar chart of revenue".into()],
                )
                .await;

            orchestrator.answer("What does the chart show?").await;
            let calls = llm.calls();
            let parts = &calls[0];
            if images {
                assert_eq!(parts.len(), 2);
                assert!(matches!(
                    &parts[1],
                    PromptPart::Image { mime_type, .. } if mime_type == "image/jpeg"
                ));
                assert!(!text_part(parts).contains("Bar chart of revenue"));
            } else {
                assert_eq!(parts.len(), 1);
                assert!(text_part(parts).contains("[Image] Bar chart of revenue"));
            }
        }
    }

    #[tokio::test]
    async fn content_free_hits_fall_back_to_zero_shot() {
        let (orchestrator, context, _, llm) =
            setup(ListIndex::default(), ScriptedLlm::replying("No idea.", false));
        context
            .register_bucket(
                ElementKind::Text,
                vec![Element::text("   ", origin())],
                vec!["A heading".into()],
            )
            .await;

        let answer = orchestrator.respond("anything").await;
        assert_eq!(answer.path, AnswerPath::ZeroShot);
        assert!(text_part(&llm.calls()[0]).contains("No relevant content found"));
    }

    #[tokio::test]
    async fn failures_become_an_apology() {
        let (orchestrator, _, _, _) = setup(ListIndex::default(), ScriptedLlm::failing());
        let answer = orchestrator.respond("question").await;
        assert_eq!(answer.path, AnswerPath::Degraded);
        assert_eq!(answer.text, APOLOGY_REPLY);

        let (orchestrator, _, _, llm) = setup(
            ListIndex {
                fail: true,
                ..Default::default()
            },
            ScriptedLlm::replying("unused", false),
        );
        assert_eq!(orchestrator.answer("question").await, APOLOGY_REPLY);
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn retrieval_skips_identifiers_missing_from_the_store() {
        let (orchestrator, context, index, _) =
            setup(ListIndex::default(), ScriptedLlm::replying("ok", false));
        index
            .upsert(vec![IndexEntry {
                id: ElementId::generate(),
                kind: ElementKind::Text,
                summary: "orphan".into(),
                source: "doc.pdf".into(),
                page_number: None,
            }])
            .await
            .expect("upsert");
        context
            .register_bucket(
                ElementKind::Text,
                vec![Element::text("kept", origin())],
                vec!["kept summary".into()],
            )
            .await;

        let retrieved = orchestrator.retrieve("kept", 3).await.expect("retrieve");
        assert_eq!(retrieved.len(), 1);
        assert_eq!(retrieved[0].summary, "kept summary");
        assert_eq!(retrieved[0].rank, 2);
    }
}
