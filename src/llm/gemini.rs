//! Google Gemini `generateContent` client.

use super::{LanguageModel, LlmError, PromptPart, http_client, status_error};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

/// Public Gemini API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Hosted multimodal backend.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    /// Construct a client for `model` at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            http: http_client("multimodal-rag/gemini")?,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default, rename = "promptFeedback")]
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

fn request_parts(parts: &[PromptPart]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| match part {
            PromptPart::Text(text) => json!({ "text": text }),
            PromptPart::Image {
                mime_type,
                data_base64,
            } => json!({
                "inline_data": { "mime_type": mime_type, "data": data_base64 }
            }),
        })
        .collect()
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn complete(&self, parts: &[PromptPart]) -> Result<String, LlmError> {
        let payload = json!({
            "contents": [{ "role": "user", "parts": request_parts(parts) }]
        });

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                LlmError::ProviderUnavailable(format!("failed to reach Gemini: {error}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let body: GenerateResponse = response.json().await.map_err(|error| {
            LlmError::InvalidResponse(format!("failed to decode Gemini response: {error}"))
        })?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LlmError::InvalidResponse(match body.prompt_feedback {
                Some(feedback) => format!("no candidate text (feedback: {feedback})"),
                None => "no candidate text".into(),
            }));
        }
        Ok(text.trim().to_string())
    }

    fn supports_images(&self) -> bool {
        true
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn sends_inline_images_and_joins_candidate_parts() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/gemini-2.5-flash:generateContent")
                    .header("x-goog-api-key", "secret")
                    .body_contains("inline_data")
                    .body_contains("image/jpeg");
                then.status(200).json_body(json!({
                    "candidates": [{
                        "content": { "parts": [{ "text": "The chart " }, { "text": "rises." }] }
                    }]
                }));
            })
            .await;

        let client =
            GeminiClient::new(server.base_url(), "secret", "gemini-2.5-flash").expect("client");
        let reply = client
            .complete(&[
                PromptPart::text("What does the chart show?"),
                PromptPart::Image {
                    mime_type: "image/jpeg".into(),
                    data_base64: "/9j/".into(),
                },
            ])
            .await
            .expect("reply");

        mock.assert();
        assert_eq!(reply, "The chart rises.");
    }

    #[tokio::test]
    async fn blocked_prompts_surface_as_invalid_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/gemini-2.5-flash:generateContent");
                then.status(200).json_body(json!({
                    "candidates": [],
                    "promptFeedback": { "blockReason": "SAFETY" }
                }));
            })
            .await;

        let client =
            GeminiClient::new(server.base_url(), "secret", "gemini-2.5-flash").expect("client");
        let error = client.complete(&[PromptPart::text("hi")]).await.unwrap_err();
        assert!(matches!(error, LlmError::InvalidResponse(message) if message.contains("SAFETY")));
    }

    #[tokio::test]
    async fn quota_errors_are_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/gemini-2.5-flash:generateContent");
                then.status(429).body("quota");
            })
            .await;

        let client =
            GeminiClient::new(server.base_url(), "secret", "gemini-2.5-flash").expect("client");
        let error = client.complete(&[PromptPart::text("hi")]).await.unwrap_err();
        assert!(matches!(error, LlmError::ProviderUnavailable(_)));
    }
}
