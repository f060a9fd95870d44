use crate::config::{Config, EmbeddingProvider};
use crate::resilience::Retryable;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
}

impl Retryable for EmbeddingClientError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable(_))
    }
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;

    /// Length of every produced vector.
    fn dimension(&self) -> usize;
}

/// Deterministic feature-hashing embedder.
///
/// Lowercased word tokens are hashed into buckets and the vector is L2-normalised, so texts that
/// share vocabulary land close together under cosine distance. Useful offline and in tests.
pub struct HashedEmbeddingClient {
    dimension: usize,
}

impl HashedEmbeddingClient {
    /// Construct an embedder producing vectors of `dimension` components.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let token = token.to_lowercase();
            let position = (fnv1a(token.as_bytes()) % dimension as u64) as usize;
            embedding[position] += 1.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

#[async_trait]
impl EmbeddingClient for HashedEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        Ok(texts
            .into_iter()
            .map(|text| Self::encode(&text, self.dimension))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Ollama `/api/embed` client.
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl OllamaEmbeddingClient {
    /// Construct a client for `model`, expecting vectors of `dimension` components.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent("multimodal-rag/embed")
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
            dimension,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();

        tracing::debug!(
            model = %self.model,
            dimension = self.dimension,
            count = expected,
            "Generating embeddings"
        );

        let response = self
            .http
            .post(self.endpoint())
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::ProviderUnavailable(format!(
                "Ollama returned {status}: {body}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: EmbedResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::GenerationFailed(format!(
                "failed to decode embedding response: {error}"
            ))
        })?;

        if body.embeddings.len() != expected {
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "expected {expected} embeddings, received {}",
                body.embeddings.len()
            )));
        }
        if let Some(bad) = body
            .embeddings
            .iter()
            .find(|vector| vector.len() != self.dimension)
        {
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "model '{}' produced {} dimensions, EMBEDDING_DIMENSION is {}",
                self.model,
                bad.len(),
                self.dimension
            )));
        }

        Ok(body.embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Build an embedding client suitable for the given configuration.
pub fn build_embedding_client(
    config: &Config,
) -> Result<Box<dyn EmbeddingClient>, EmbeddingClientError> {
    match config.embedding_provider {
        EmbeddingProvider::Hashed => Ok(Box::new(HashedEmbeddingClient::new(
            config.embedding_dimension,
        ))),
        EmbeddingProvider::Ollama => OllamaEmbeddingClient::new(
            config.ollama_url.clone(),
            config.embedding_model.clone(),
            config.embedding_dimension,
        )
        .map(|client| Box::new(client) as Box<dyn EmbeddingClient>)
        .map_err(|error| EmbeddingClientError::GenerationFailed(error.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn hashed_vectors_are_normalised_and_reflect_overlap() {
        let client = HashedEmbeddingClient::new(64);
        let vectors = client
            .generate_embeddings(vec![
                "attention transformer layers".into(),
                "Transformer attention".into(),
                "banana bread recipe".into(),
                String::new(),
            ])
            .await
            .expect("embeddings");

        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(cosine(&vectors[0], &vectors[1]) > cosine(&vectors[0], &vectors[2]));
        assert!(vectors[3].iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn ollama_embeddings_are_validated_against_dimension() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/embed")
                    .json_body_partial(r#"{"model": "nomic-embed-text"}"#);
                then.status(200)
                    .json_body(json!({ "embeddings": [[0.1, 0.2, 0.3], [0.3, 0.2, 0.1]] }));
            })
            .await;

        let client =
            OllamaEmbeddingClient::new(server.base_url(), "nomic-embed-text", 3).expect("client");
        let vectors = client
            .generate_embeddings(vec!["a".into(), "b".into()])
            .await
            .expect("embeddings");
        mock.assert();
        assert_eq!(vectors.len(), 2);

        let mismatched =
            OllamaEmbeddingClient::new(server.base_url(), "nomic-embed-text", 768).expect("client");
        let error = mismatched
            .generate_embeddings(vec!["a".into(), "b".into()])
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            EmbeddingClientError::GenerationFailed(message) if message.contains("768")
        ));
    }
}
