//! Element summarization through a local model runtime.
//!
//! [`SummarizationClient`] is the single-call provider seam; [`Summarizer`] layers the batching
//! contract on top: bounded concurrency, input-order results, per-item failure isolation, and
//! the timeout/retry policy shared by every collaborator call.

use crate::config::Config;
use crate::extraction::{Element, Payload};
use crate::resilience::{CallError, CallPolicy, Retryable, call_with_policy};
use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// Prompt shared by text and table summaries.
pub const TEXT_PROMPT: &str = "Summarize the following table or text concisely in 1-2 sentences.\n\
Do not add any commentary or phrases like \"Here is the summary\".\n\nInput: ";

/// Prompt used for image descriptions.
pub const IMAGE_PROMPT: &str = "Describe this image accurately, in technical detail.";

const IMAGE_TEMPERATURE: f32 = 0.0;

/// Errors surfaced by a single summarization call.
#[derive(Debug, Error)]
pub enum SummarizationClientError {
    /// Provider was unreachable.
    #[error("Summarization provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate summary: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

impl Retryable for SummarizationClientError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable(_))
    }
}

/// Request payload passed to the summarization provider.
#[derive(Debug, Clone)]
pub struct SummarizationRequest {
    /// Model identifier understood by the provider.
    pub model: String,
    /// Fully assembled prompt.
    pub prompt: String,
    /// Base64 images attached to the prompt (vision models only).
    pub images: Vec<String>,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Interface implemented by summarization providers.
#[async_trait]
pub trait SummarizationClient: Send + Sync {
    /// Generate one summary.
    async fn generate_summary(
        &self,
        request: SummarizationRequest,
    ) -> Result<String, SummarizationClientError>;
}

/// Ollama `/api/generate` client.
pub struct OllamaSummarizationClient {
    http: Client,
    base_url: String,
}

impl OllamaSummarizationClient {
    /// Construct a client for the runtime at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent("multimodal-rag/summary")
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl SummarizationClient for OllamaSummarizationClient {
    async fn generate_summary(
        &self,
        request: SummarizationRequest,
    ) -> Result<String, SummarizationClientError> {
        let mut payload = json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": false,
            "options": {
                "temperature": request.temperature,
            }
        });
        if !request.images.is_empty() {
            payload["images"] = json!(request.images);
        }

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                SummarizationClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizationClientError::GenerationFailed(format!(
                "model '{}' not available: {body}",
                request.model
            )));
        }

        if response.status().is_server_error() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizationClientError::ProviderUnavailable(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizationClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            SummarizationClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        if !body.done {
            return Err(SummarizationClientError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}

/// Batch-level summarization failure.
#[derive(Debug, Error)]
pub enum SummarizationError {
    /// Every item of a non-empty batch failed because the provider could not be reached.
    #[error("Summarizer unreachable for the entire {batch} batch ({size} items): {reason}")]
    Unavailable {
        /// Which batch failed (`text` or `image`).
        batch: &'static str,
        /// Number of items attempted.
        size: usize,
        /// Last provider diagnostic.
        reason: String,
    },
}

/// Models and limits applied by [`Summarizer`].
#[derive(Debug, Clone)]
pub struct SummarizerSettings {
    /// Model for text and table summaries.
    pub text_model: String,
    /// Vision model for image descriptions.
    pub image_model: String,
    /// Temperature for text and table summaries.
    pub temperature: f32,
    /// Maximum in-flight calls per batch.
    pub max_concurrency: usize,
    /// Timeout and retry policy per call.
    pub policy: CallPolicy,
}

impl SummarizerSettings {
    /// Derive settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            text_model: config.summary_model.clone(),
            image_model: config.image_summary_model.clone(),
            temperature: config.summary_temperature,
            max_concurrency: config.summary_max_concurrency,
            policy: config.call_policy(),
        }
    }
}

enum ItemOutcome {
    Skipped,
    Summary(String),
    Unavailable(String),
    Failed,
}

/// Batching summarizer over a [`SummarizationClient`].
#[derive(Clone)]
pub struct Summarizer {
    client: Arc<dyn SummarizationClient>,
    settings: SummarizerSettings,
}

impl Summarizer {
    /// Wrap `client` with the given batching settings.
    pub fn new(client: Arc<dyn SummarizationClient>, settings: SummarizerSettings) -> Self {
        Self { client, settings }
    }

    /// Summarize text contents, preserving input order and length.
    ///
    /// Blank inputs and items that fail individually yield an empty string.
    pub async fn summarize_batch(
        &self,
        contents: &[String],
    ) -> Result<Vec<String>, SummarizationError> {
        let requests = contents
            .iter()
            .map(|content| {
                (!content.trim().is_empty()).then(|| SummarizationRequest {
                    model: self.settings.text_model.clone(),
                    prompt: format!("{TEXT_PROMPT}{content}"),
                    images: Vec::new(),
                    temperature: self.settings.temperature,
                })
            })
            .collect();
        self.run_batch("text", requests).await
    }

    /// Summarize text and table elements; tables use their HTML rendering.
    pub async fn summarize_elements(
        &self,
        elements: &[Element],
    ) -> Result<Vec<String>, SummarizationError> {
        let contents: Vec<String> = elements
            .iter()
            .map(|element| element.summarization_input().to_string())
            .collect();
        self.summarize_batch(&contents).await
    }

    /// Describe image elements, preserving input order and length.
    pub async fn summarize_images(
        &self,
        images: &[Element],
    ) -> Result<Vec<String>, SummarizationError> {
        let requests = images
            .iter()
            .map(|image| match image.payload() {
                Payload::Image { data_base64, .. } if !data_base64.trim().is_empty() => {
                    Some(SummarizationRequest {
                        model: self.settings.image_model.clone(),
                        prompt: IMAGE_PROMPT.to_string(),
                        images: vec![data_base64.clone()],
                        temperature: IMAGE_TEMPERATURE,
                    })
                }
                _ => None,
            })
            .collect();
        self.run_batch("image", requests).await
    }

    async fn run_batch(
        &self,
        batch: &'static str,
        requests: Vec<Option<SummarizationRequest>>,
    ) -> Result<Vec<String>, SummarizationError> {
        let width = self.settings.max_concurrency.max(1);
        let outcomes: Vec<ItemOutcome> = stream::iter(requests.into_iter().enumerate())
            .map(|(index, request)| self.summarize_one(batch, index, request))
            .buffered(width)
            .collect()
            .await;

        let attempted = outcomes
            .iter()
            .filter(|outcome| !matches!(outcome, ItemOutcome::Skipped))
            .count();
        let unavailable: Vec<&str> = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                ItemOutcome::Unavailable(reason) => Some(reason.as_str()),
                _ => None,
            })
            .collect();
        if attempted > 0 && unavailable.len() == attempted {
            return Err(SummarizationError::Unavailable {
                batch,
                size: attempted,
                reason: unavailable.last().copied().unwrap_or_default().to_string(),
            });
        }
        let failed = unavailable.len();

        let summaries: Vec<String> = outcomes
            .into_iter()
            .map(|outcome| match outcome {
                ItemOutcome::Summary(summary) => summary,
                _ => String::new(),
            })
            .collect();
        tracing::debug!(
            batch,
            items = summaries.len(),
            attempted,
            failed,
            "Summarized batch"
        );
        Ok(summaries)
    }

    async fn summarize_one(
        &self,
        batch: &'static str,
        index: usize,
        request: Option<SummarizationRequest>,
    ) -> ItemOutcome {
        let Some(request) = request else {
            return ItemOutcome::Skipped;
        };
        let client = self.client.as_ref();
        let result = call_with_policy(&self.settings.policy, "summarize", || {
            client.generate_summary(request.clone())
        })
        .await;

        match result {
            Ok(summary) => ItemOutcome::Summary(summary),
            Err(CallError::Failed(SummarizationClientError::ProviderUnavailable(reason))) => {
                tracing::warn!(batch, index, reason = %reason, "Summarizer unreachable for item");
                ItemOutcome::Unavailable(reason)
            }
            Err(error @ CallError::Timeout { .. }) => {
                tracing::warn!(batch, index, error = %error, "Summarization timed out");
                ItemOutcome::Unavailable(error.to_string())
            }
            Err(error) => {
                tracing::warn!(batch, index, error = %error, "Summarization failed for item");
                ItemOutcome::Failed
            }
        }
    }
}

/// Build the configured summarizer.
pub fn build_summarizer(config: &Config) -> Result<Summarizer, reqwest::Error> {
    let client = OllamaSummarizationClient::new(config.ollama_url.clone())?;
    Ok(Summarizer::new(
        Arc::new(client),
        SummarizerSettings::from_config(config),
    ))
}
