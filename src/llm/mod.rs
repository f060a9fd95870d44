//! Answering language models.
//!
//! A [`LanguageModel`] takes an ordered list of [`PromptPart`]s (text interleaved with inline
//! images) and returns the model's text reply. Backends that cannot read images report so via
//! [`LanguageModel::supports_images`], and the answering orchestrator falls back to image
//! summaries for them.

pub mod gemini;
pub mod ollama;

use crate::config::{Config, LlmProvider};
use crate::resilience::Retryable;
use async_trait::async_trait;
use thiserror::Error;

pub use gemini::GeminiClient;
pub use ollama::OllamaChatClient;

/// One segment of a prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptPart {
    /// Plain text.
    Text(String),
    /// Inline image attachment.
    Image {
        /// MIME type of the encoded image.
        mime_type: String,
        /// Base64 image bytes.
        data_base64: String,
    },
}

impl PromptPart {
    /// Convenience constructor for text parts.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// Errors surfaced by language-model backends.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Backend could not be reached or is overloaded.
    #[error("Language model unavailable: {0}")]
    ProviderUnavailable(String),
    /// Backend rejected the request.
    #[error("Language model request failed: {0}")]
    RequestFailed(String),
    /// Backend response could not be decoded or carried no text.
    #[error("Malformed language model response: {0}")]
    InvalidResponse(String),
}

impl Retryable for LlmError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable(_))
    }
}

/// Text-completion capability used by the answering orchestrator.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Produce a reply for the given prompt parts.
    async fn complete(&self, parts: &[PromptPart]) -> Result<String, LlmError>;

    /// Whether image parts are understood natively.
    fn supports_images(&self) -> bool;

    /// Model identifier for logs.
    fn model(&self) -> &str;
}

/// Build the backend selected by `LLM_PROVIDER`.
pub fn build_language_model(config: &Config) -> Result<Box<dyn LanguageModel>, LlmError> {
    match config.llm_provider {
        LlmProvider::Gemini => {
            let api_key = config.google_api_key.clone().ok_or_else(|| {
                LlmError::RequestFailed("GOOGLE_API_KEY is required for Gemini".into())
            })?;
            Ok(Box::new(GeminiClient::new(
                gemini::DEFAULT_BASE_URL,
                api_key,
                config.llm_model.clone(),
            )?))
        }
        LlmProvider::Ollama => Ok(Box::new(OllamaChatClient::new(
            config.ollama_url.clone(),
            config.llm_model.clone(),
        )?)),
    }
}

pub(crate) fn http_client(agent: &str) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .user_agent(agent)
        .build()
        .map_err(|error| LlmError::RequestFailed(format!("failed to build HTTP client: {error}")))
}

/// Map a non-success HTTP status to the matching error variant.
pub(crate) fn status_error(status: reqwest::StatusCode, body: String) -> LlmError {
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        LlmError::ProviderUnavailable(format!("{status}: {body}"))
    } else {
        LlmError::RequestFailed(format!("{status}: {body}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overload_statuses_are_retryable() {
        use reqwest::StatusCode;
        assert!(status_error(StatusCode::SERVICE_UNAVAILABLE, String::new()).is_retryable());
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, String::new()).is_retryable());
        assert!(!status_error(StatusCode::BAD_REQUEST, String::new()).is_retryable());
    }

    #[test]
    fn factory_builds_ollama_without_key() {
        let config = Config::from_lookup(|key| match key {
            "LLM_PROVIDER" => Some("ollama".into()),
            "LLM_MODEL" => Some("llava:13b".into()),
            _ => None,
        })
        .expect("config");
        let model = build_language_model(&config).expect("model");
        assert_eq!(model.model(), "llava:13b");
        assert!(model.supports_images());
    }
}
