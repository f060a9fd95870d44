//! Client for an Unstructured-compatible partition service.
//!
//! The service performs layout analysis (tables, figures) and returns a flat list of typed
//! elements. Composition into sections happens locally via [`compose_by_title`] so that both
//! extractor adapters share identical chunking semantics.

use super::compose::{Block, ChunkingOptions, LocatedBlock, compose_by_title};
use super::types::{DocumentSource, Element, ExtractionError};
use super::Extractor;
use crate::config::ExtractionStrategy;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

const PARTITION_PATH: &str = "/general/v0/general";
const API_KEY_HEADER: &str = "unstructured-api-key";

/// Connection and request settings for the partition service.
#[derive(Debug, Clone)]
pub struct UnstructuredSettings {
    /// Base URL of the service, or the full partition endpoint.
    pub url: String,
    /// Optional API key sent in the `unstructured-api-key` header.
    pub api_key: Option<String>,
    /// Layout-analysis strategy forwarded to the service.
    pub strategy: ExtractionStrategy,
    /// Whether image blocks are requested as base64 payloads.
    pub extract_images: bool,
    /// Section composition bounds.
    pub options: ChunkingOptions,
}

/// Extractor backed by a remote partition service.
pub struct UnstructuredExtractor {
    http: Client,
    settings: UnstructuredSettings,
}

impl UnstructuredExtractor {
    /// Construct the adapter.
    pub fn new(settings: UnstructuredSettings) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent("multimodal-rag/extract")
            .build()?;
        Ok(Self { http, settings })
    }

    fn endpoint(&self) -> String {
        let base = self.settings.url.trim_end_matches('/');
        if base.ends_with(PARTITION_PATH) {
            base.to_string()
        } else {
            format!("{base}{PARTITION_PATH}")
        }
    }

    fn form(&self, file_name: String, data: Vec<u8>) -> Form {
        let mut form = Form::new()
            .part("files", Part::bytes(data).file_name(file_name))
            .text("strategy", self.settings.strategy.as_str())
            .text("pdf_infer_table_structure", "true");
        if self.settings.extract_images {
            form = form
                .text("extract_image_block_types", "Image")
                .text("extract_image_block_to_payload", "true");
        }
        form
    }
}

#[derive(Debug, Deserialize)]
struct PartitionElement {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    metadata: PartitionMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct PartitionMetadata {
    page_number: Option<u32>,
    text_as_html: Option<String>,
    image_base64: Option<String>,
    image_mime_type: Option<String>,
}

#[async_trait]
impl Extractor for UnstructuredExtractor {
    async fn extract(&self, source: &DocumentSource) -> Result<Vec<Element>, ExtractionError> {
        let source_name = source.display_name();
        let data = source.load_pdf().await?;

        let mut request = self
            .http
            .post(self.endpoint())
            .multipart(self.form(source_name.clone(), data));
        if let Some(key) = &self.settings.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request
            .send()
            .await
            .map_err(|error| ExtractionError::Service {
                source_name: source_name.clone(),
                reason: format!("failed to reach partition service: {error}"),
                transient: true,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // 422 means the service parsed the request and rejected the document itself.
            if status == StatusCode::UNPROCESSABLE_ENTITY {
                return Err(ExtractionError::Corrupt {
                    source_name,
                    reason: body,
                });
            }
            return Err(ExtractionError::Service {
                source_name,
                reason: format!("partition service returned {status}: {body}"),
                transient: status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
            });
        }

        let raw: Vec<PartitionElement> =
            response
                .json()
                .await
                .map_err(|error| ExtractionError::Service {
                    source_name: source_name.clone(),
                    reason: format!("malformed partition response: {error}"),
                    transient: false,
                })?;

        let reported = raw.len();
        let blocks: Vec<LocatedBlock> = raw
            .into_iter()
            .filter_map(|element| to_block(&source_name, element))
            .collect();
        let elements = compose_by_title(&source_name, blocks, &self.settings.options);

        tracing::info!(
            source = %source_name,
            reported,
            elements = elements.len(),
            "Partition service extraction complete"
        );
        Ok(elements)
    }

    fn name(&self) -> &str {
        "unstructured"
    }
}

fn to_block(source_name: &str, element: PartitionElement) -> Option<LocatedBlock> {
    let PartitionElement {
        kind,
        text,
        metadata,
    } = element;
    let block = match kind.as_str() {
        "Title" => Block::Title(text),
        "NarrativeText" | "ListItem" | "Text" | "UncategorizedText" | "FigureCaption"
        | "Address" | "EmailAddress" | "Formula" | "CodeSnippet" => Block::Narrative(text),
        "Table" => Block::Table {
            text,
            html: metadata.text_as_html,
        },
        "Image" => match metadata.image_base64 {
            Some(data_base64) if !data_base64.is_empty() => Block::Image {
                mime_type: metadata
                    .image_mime_type
                    .unwrap_or_else(|| "image/jpeg".to_string()),
                data_base64,
            },
            _ => {
                // Image blocks without payload still carry OCR'd text.
                if text.trim().is_empty() {
                    return None;
                }
                Block::Narrative(text)
            }
        },
        "Header" | "Footer" | "PageBreak" | "PageNumber" => return None,
        other => {
            tracing::warn!(
                source = source_name,
                element_type = other,
                "Dropping element of unrecognized type"
            );
            return None;
        }
    };
    Some(LocatedBlock {
        block,
        page_number: metadata.page_number,
    })
}
