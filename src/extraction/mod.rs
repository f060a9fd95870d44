//! PDF extraction: turning documents into typed elements.
//!
//! Two adapters implement [`Extractor`]: an in-process reader built on `lopdf` and a client for
//! an Unstructured-compatible partition service. Both feed their flat block streams through
//! [`compose::compose_by_title`], so the element shape handed to ingestion is the same
//! whichever adapter is configured.

pub mod chunking;
pub mod compose;
pub mod local;
pub mod source;
pub mod types;
pub mod unstructured;

use crate::config::{Config, ExtractorProvider};
use async_trait::async_trait;
use thiserror::Error;

pub use compose::ChunkingOptions;
pub use local::LocalPdfExtractor;
pub use source::collect_pdf_sources;
pub use types::{DocumentSource, Element, ElementKind, ExtractionError, Payload, Provenance};
pub use unstructured::{UnstructuredExtractor, UnstructuredSettings};

/// Converts one document into an ordered list of elements.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract composite text, table, and (nested) image elements from `source`.
    async fn extract(&self, source: &DocumentSource) -> Result<Vec<Element>, ExtractionError>;

    /// Short adapter name for logs.
    fn name(&self) -> &str;
}

/// Errors raised while constructing an extractor from configuration.
#[derive(Debug, Error)]
pub enum ExtractorBuildError {
    /// The partition service adapter needs a URL.
    #[error("UNSTRUCTURED_URL is required for the unstructured extractor")]
    MissingUrl,
    /// HTTP client construction failed.
    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Chunking bounds derived from configuration.
pub fn chunking_options(config: &Config) -> ChunkingOptions {
    ChunkingOptions {
        max_characters: config.extract_max_characters,
        combine_under_chars: config.extract_combine_under_chars,
        new_after_chars: config.extract_new_after_chars,
    }
}

/// Build the extractor selected by `EXTRACTOR_PROVIDER`.
pub fn build_extractor(config: &Config) -> Result<Box<dyn Extractor>, ExtractorBuildError> {
    let options = chunking_options(config);
    match config.extractor_provider {
        ExtractorProvider::Local => Ok(Box::new(LocalPdfExtractor::new(
            options,
            config.extract_images,
            config.extract_strategy,
        ))),
        ExtractorProvider::Unstructured => {
            let url = config
                .unstructured_url
                .clone()
                .ok_or(ExtractorBuildError::MissingUrl)?;
            Ok(Box::new(UnstructuredExtractor::new(UnstructuredSettings {
                url,
                api_key: config.unstructured_api_key.clone(),
                strategy: config.extract_strategy,
                extract_images: config.extract_images,
                options,
            })?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_follows_provider_setting() {
        let local = Config::from_lookup(|key| match key {
            "LLM_PROVIDER" => Some("ollama".into()),
            _ => None,
        })
        .expect("config");
        assert_eq!(build_extractor(&local).expect("local").name(), "local");

        let remote = Config::from_lookup(|key| match key {
            "LLM_PROVIDER" => Some("ollama".into()),
            "EXTRACTOR_PROVIDER" => Some("unstructured".into()),
            "UNSTRUCTURED_URL" => Some("http://127.0.0.1:8000".into()),
            _ => None,
        })
        .expect("config");
        assert_eq!(build_extractor(&remote).expect("remote").name(), "unstructured");
    }
}
