//! Ollama `/api/chat` client.

use super::{LanguageModel, LlmError, PromptPart, http_client, status_error};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

const VISION_MODEL_PREFIXES: &[&str] = &[
    "llava",
    "bakllava",
    "llama3.2-vision",
    "moondream",
    "minicpm-v",
    "gemma3",
    "qwen2.5vl",
];

/// Local chat backend.
pub struct OllamaChatClient {
    http: Client,
    base_url: String,
    model: String,
    vision: bool,
}

impl OllamaChatClient {
    /// Construct a client; image support is inferred from the model family.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self, LlmError> {
        let model = model.into();
        let vision = is_vision_model(&model);
        Ok(Self {
            http: http_client("multimodal-rag/chat")?,
            base_url: base_url.into(),
            model,
            vision,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }
}

fn is_vision_model(model: &str) -> bool {
    let name = model.rsplit('/').next().unwrap_or(model).to_lowercase();
    VISION_MODEL_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl LanguageModel for OllamaChatClient {
    async fn complete(&self, parts: &[PromptPart]) -> Result<String, LlmError> {
        let mut content = Vec::new();
        let mut images = Vec::new();
        for part in parts {
            match part {
                PromptPart::Text(text) => content.push(text.as_str()),
                PromptPart::Image { data_base64, .. } => images.push(data_base64.as_str()),
            }
        }

        let mut message = json!({ "role": "user", "content": content.join("\n") });
        if !images.is_empty() {
            message["images"] = json!(images);
        }
        let payload = json!({
            "model": self.model,
            "messages": [message],
            "stream": false,
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                LlmError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let body: ChatResponse = response.json().await.map_err(|error| {
            LlmError::InvalidResponse(format!("failed to decode Ollama chat response: {error}"))
        })?;
        if !body.done {
            return Err(LlmError::InvalidResponse(
                "Ollama chat response incomplete (streaming not supported)".into(),
            ));
        }
        let reply = body
            .message
            .map(|message| message.content.trim().to_string())
            .unwrap_or_default();
        if reply.is_empty() {
            return Err(LlmError::InvalidResponse("empty chat message".into()));
        }
        Ok(reply)
    }

    fn supports_images(&self) -> bool {
        self.vision
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[test]
    fn vision_support_follows_model_family() {
        assert!(is_vision_model("llava:13b"));
        assert!(is_vision_model("library/bakllava"));
        assert!(!is_vision_model("gemma:2b"));
    }

    #[tokio::test]
    async fn images_travel_in_the_message_images_field() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/chat")
                    .json_body_partial(r#"{"model": "llava", "stream": false}"#)
                    .body_contains(r#""images":["/9j/"]"#);
                then.status(200).json_body(json!({
                    "message": { "role": "assistant", "content": " A cat. " },
                    "done": true
                }));
            })
            .await;

        let client = OllamaChatClient::new(server.base_url(), "llava").expect("client");
        let reply = client
            .complete(&[
                PromptPart::text("What is shown?"),
                PromptPart::Image {
                    mime_type: "image/jpeg".into(),
                    data_base64: "/9j/".into(),
                },
            ])
            .await
            .expect("reply");

        mock.assert();
        assert_eq!(reply, "A cat.");
    }

    #[tokio::test]
    async fn unreachable_runtime_is_retryable() {
        let client = OllamaChatClient::new("http://127.0.0.1:9", "gemma:2b").expect("client");
        let error = client.complete(&[PromptPart::text("hi")]).await.unwrap_err();
        assert!(matches!(error, LlmError::ProviderUnavailable(_)));
    }
}
