use crate::resilience::CallPolicy;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_DATA_DIR: &str = "./rag_store";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_QDRANT_URL: &str = "http://127.0.0.1:6333";
const DEFAULT_COLLECTION: &str = "multi_modal_rag";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the RAG service.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Root directory for persisted state (document store files).
    pub data_dir: PathBuf,
    /// Which extractor adapter turns PDFs into elements.
    pub extractor_provider: ExtractorProvider,
    /// Base URL of the Unstructured-compatible partition service.
    pub unstructured_url: Option<String>,
    /// Optional API key for the partition service.
    pub unstructured_api_key: Option<String>,
    /// Layout-analysis fidelity requested from the extractor.
    pub extract_strategy: ExtractionStrategy,
    /// Hard upper bound on characters per composite text element.
    pub extract_max_characters: usize,
    /// Composite elements shorter than this are merged with their neighbour.
    pub extract_combine_under_chars: usize,
    /// Soft bound after which a new composite element is started.
    pub extract_new_after_chars: usize,
    /// Whether embedded images are extracted.
    pub extract_images: bool,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Spawn `ollama serve` when the runtime is unreachable at bootstrap.
    pub ollama_autostart: bool,
    /// Model used for text and table summaries.
    pub summary_model: String,
    /// Vision model used for image descriptions.
    pub image_summary_model: String,
    /// Sampling temperature for text and table summaries.
    pub summary_temperature: f32,
    /// Maximum concurrent summarization calls within one batch.
    pub summary_max_concurrency: usize,
    /// Backend answering user questions.
    pub llm_provider: LlmProvider,
    /// Model identifier for the answering backend.
    pub llm_model: String,
    /// API key for the hosted Gemini backend.
    pub google_api_key: Option<String>,
    /// Embedding provider used for summary vectors.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the Qdrant instance that stores summary vectors.
    pub qdrant_url: String,
    /// Name of the Qdrant collection holding summaries.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Number of summaries retrieved per question.
    pub retrieval_top_k: usize,
    /// Per-attempt timeout for collaborator calls, in seconds.
    pub collaborator_timeout_secs: u64,
    /// Retries after the first failed collaborator attempt.
    pub collaborator_max_retries: u32,
    /// Initial backoff between retries, in milliseconds.
    pub collaborator_backoff_ms: u64,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Extractor adapters available to the ingestion pipeline.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorProvider {
    /// In-process PDF reader (text and embedded JPEG images).
    Local,
    /// Remote Unstructured-compatible partition service.
    Unstructured,
}

/// Layout-analysis fidelity level.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Text layer only.
    Fast,
    /// Model-based layout analysis (tables, images).
    HiRes,
    /// Let the extractor decide per document.
    Auto,
}

impl ExtractionStrategy {
    /// Wire name understood by partition services.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::HiRes => "hi_res",
            Self::Auto => "auto",
        }
    }
}

/// Answering backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Hosted Google Gemini API.
    Gemini,
    /// Local Ollama runtime.
    Ollama,
}

/// Supported embedding backends for summary vectors.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic hashed embeddings, for offline runs and tests.
    Hashed,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Blank values are treated as absent so that `KEY=` in a `.env` file falls back to the
    /// default instead of failing to parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let llm_provider: LlmProvider = parse_or(&get, "LLM_PROVIDER", LlmProvider::Gemini)?;
        let google_api_key = get("GOOGLE_API_KEY");
        if llm_provider == LlmProvider::Gemini && google_api_key.is_none() {
            return Err(ConfigError::MissingVariable("GOOGLE_API_KEY".into()));
        }

        let extractor_provider: ExtractorProvider =
            parse_or(&get, "EXTRACTOR_PROVIDER", ExtractorProvider::Local)?;
        let unstructured_url = get("UNSTRUCTURED_URL");
        if extractor_provider == ExtractorProvider::Unstructured && unstructured_url.is_none() {
            return Err(ConfigError::MissingVariable("UNSTRUCTURED_URL".into()));
        }

        let summary_max_concurrency: usize = parse_or(&get, "SUMMARY_MAX_CONCURRENCY", 3)?;
        if summary_max_concurrency == 0 {
            return Err(ConfigError::InvalidValue("SUMMARY_MAX_CONCURRENCY".into()));
        }
        let retrieval_top_k: usize = parse_or(&get, "RETRIEVAL_TOP_K", 3)?;
        if retrieval_top_k == 0 {
            return Err(ConfigError::InvalidValue("RETRIEVAL_TOP_K".into()));
        }
        let embedding_dimension: usize = parse_or(&get, "EMBEDDING_DIMENSION", 768)?;
        if embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }

        Ok(Self {
            data_dir: get("RAG_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            extractor_provider,
            unstructured_url,
            unstructured_api_key: get("UNSTRUCTURED_API_KEY"),
            extract_strategy: parse_or(&get, "EXTRACT_STRATEGY", ExtractionStrategy::HiRes)?,
            extract_max_characters: parse_or(&get, "EXTRACT_MAX_CHARACTERS", 10_000)?,
            extract_combine_under_chars: parse_or(&get, "EXTRACT_COMBINE_UNDER_CHARS", 2_000)?,
            extract_new_after_chars: parse_or(&get, "EXTRACT_NEW_AFTER_CHARS", 6_000)?,
            extract_images: parse_flag(&get, "EXTRACT_IMAGES", true)?,
            ollama_url: get("OLLAMA_URL").unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            ollama_autostart: parse_flag(&get, "OLLAMA_AUTOSTART", false)?,
            summary_model: get("SUMMARY_MODEL").unwrap_or_else(|| "gemma:2b".into()),
            image_summary_model: get("IMAGE_SUMMARY_MODEL").unwrap_or_else(|| "llava".into()),
            summary_temperature: parse_or(&get, "SUMMARY_TEMPERATURE", 0.5)?,
            summary_max_concurrency,
            llm_provider,
            llm_model: get("LLM_MODEL").unwrap_or_else(|| match llm_provider {
                LlmProvider::Gemini => "gemini-2.5-flash".into(),
                LlmProvider::Ollama => "llava".into(),
            }),
            google_api_key,
            embedding_provider: parse_or(&get, "EMBEDDING_PROVIDER", EmbeddingProvider::Ollama)?,
            embedding_model: get("EMBEDDING_MODEL").unwrap_or_else(|| "nomic-embed-text".into()),
            embedding_dimension,
            qdrant_url: get("QDRANT_URL").unwrap_or_else(|| DEFAULT_QDRANT_URL.to_string()),
            qdrant_collection_name: get("QDRANT_COLLECTION_NAME")
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            qdrant_api_key: get("QDRANT_API_KEY"),
            retrieval_top_k,
            collaborator_timeout_secs: parse_or(&get, "COLLABORATOR_TIMEOUT_SECS", 120)?,
            collaborator_max_retries: parse_or(&get, "COLLABORATOR_MAX_RETRIES", 2)?,
            collaborator_backoff_ms: parse_or(&get, "COLLABORATOR_BACKOFF_MS", 500)?,
            server_port: get("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }

    /// Timeout and retry policy applied around every collaborator call.
    pub fn call_policy(&self) -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_secs(self.collaborator_timeout_secs.max(1)),
            max_retries: self.collaborator_max_retries,
            initial_backoff: Duration::from_millis(self.collaborator_backoff_ms),
        }
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

fn parse_flag<G>(get: &G, key: &str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|value| value.trim().to_lowercase()) {
        None => Ok(default),
        Some(value) => match value.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(key.to_string())),
        },
    }
}

impl FromStr for ExtractorProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "unstructured" => Ok(Self::Unstructured),
            _ => Err(()),
        }
    }
}

impl FromStr for ExtractionStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "fast" => Ok(Self::Fast),
            "hi_res" => Ok(Self::HiRes),
            "auto" => Ok(Self::Auto),
            _ => Err(()),
        }
    }
}

impl FromStr for LlmProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hashed" | "hash" => Ok(Self::Hashed),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        data_dir = %config.data_dir.display(),
        extractor = ?config.extractor_provider,
        llm_provider = ?config.llm_provider,
        embedding_provider = ?config.embedding_provider,
        collection = %config.qdrant_collection_name,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
