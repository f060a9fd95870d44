//! Element model shared by extractors, stores, and the orchestrators.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Closed set of element kinds, assigned once by the extractor adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    /// Narrative text block (a composite of titles, paragraphs, list items).
    Text,
    /// Table with a plain-text and, when available, an HTML rendering.
    Table,
    /// Embedded raster image.
    Image,
}

impl ElementKind {
    /// Stable lowercase label used in logs and index payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Table => "table",
            Self::Image => "image",
        }
    }

    /// Parse the label written by [`ElementKind::as_str`].
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "text" => Some(Self::Text),
            "table" => Some(Self::Table),
            "image" => Some(Self::Image),
            _ => None,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw element content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Payload {
    /// Plain text.
    Text {
        /// Extracted text.
        text: String,
    },
    /// Table content.
    Table {
        /// Cell text flattened into lines.
        text: String,
        /// HTML rendering preserving row/column structure.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        html: Option<String>,
    },
    /// Encoded image bytes.
    Image {
        /// MIME type of the encoded image, e.g. `image/jpeg`.
        mime_type: String,
        /// Base64 (standard alphabet) image bytes.
        data_base64: String,
    },
}

/// Where an element came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Source document identifier (file name or content digest).
    pub source: String,
    /// 1-based page number, when the extractor reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
}

/// A unit of extracted document content. Immutable once produced by an extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    kind: ElementKind,
    payload: Payload,
    provenance: Provenance,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    nested: Vec<Element>,
}

impl Element {
    /// Build a narrative text element.
    pub fn text(text: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            kind: ElementKind::Text,
            payload: Payload::Text { text: text.into() },
            provenance,
            nested: Vec::new(),
        }
    }

    /// Build a table element.
    pub fn table(text: impl Into<String>, html: Option<String>, provenance: Provenance) -> Self {
        Self {
            kind: ElementKind::Table,
            payload: Payload::Table {
                text: text.into(),
                html,
            },
            provenance,
            nested: Vec::new(),
        }
    }

    /// Build an image element from raw bytes.
    pub fn image(mime_type: impl Into<String>, bytes: &[u8], provenance: Provenance) -> Self {
        Self::image_base64(mime_type, STANDARD.encode(bytes), provenance)
    }

    /// Build an image element from already-encoded base64 data.
    pub fn image_base64(
        mime_type: impl Into<String>,
        data_base64: impl Into<String>,
        provenance: Provenance,
    ) -> Self {
        Self {
            kind: ElementKind::Image,
            payload: Payload::Image {
                mime_type: mime_type.into(),
                data_base64: data_base64.into(),
            },
            provenance,
            nested: Vec::new(),
        }
    }

    /// Attach the originally-embedded sub-elements of a composite element.
    pub fn with_nested(mut self, nested: Vec<Element>) -> Self {
        self.nested = nested;
        self
    }

    /// Declared kind.
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Raw content.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Source document and page.
    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// Originally-embedded sub-elements (images live here).
    pub fn nested(&self) -> &[Element] {
        &self.nested
    }

    /// Plain-text content; empty for images.
    pub fn text_content(&self) -> &str {
        match &self.payload {
            Payload::Text { text } | Payload::Table { text, .. } => text,
            Payload::Image { .. } => "",
        }
    }

    /// Content handed to the text summarizer. Tables prefer their HTML rendering because it
    /// keeps the row/column structure.
    pub fn summarization_input(&self) -> &str {
        match &self.payload {
            Payload::Table {
                html: Some(html), ..
            } if !html.trim().is_empty() => html,
            _ => self.text_content(),
        }
    }

    /// Whether the element carries anything worth sending to a model.
    pub fn has_content(&self) -> bool {
        match &self.payload {
            Payload::Image { data_base64, .. } => !data_base64.trim().is_empty(),
            _ => !self.text_content().trim().is_empty(),
        }
    }
}

/// Input document handed to an extractor.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// File on disk.
    Path(PathBuf),
    /// In-memory upload.
    Bytes {
        /// Original file name, when known.
        name: Option<String>,
        /// File contents.
        data: Vec<u8>,
    },
}

/// Errors raised while turning a document into elements.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Input is not a PDF (wrong extension or missing `%PDF-` header).
    #[error("Unsupported input '{source_name}': {reason}")]
    UnsupportedInput {
        /// Document identifier.
        source_name: String,
        /// Why the input was rejected.
        reason: String,
    },
    /// File could not be read.
    #[error("Failed to read '{source_name}': {error}")]
    Io {
        /// Document identifier.
        source_name: String,
        /// Underlying I/O error.
        #[source]
        error: std::io::Error,
    },
    /// PDF structure could not be parsed.
    #[error("Corrupt PDF '{source_name}': {reason}")]
    Corrupt {
        /// Document identifier.
        source_name: String,
        /// Parser diagnostic.
        reason: String,
    },
    /// Partition service was unreachable or returned an error.
    #[error("Extractor service failed for '{source_name}': {reason}")]
    Service {
        /// Document identifier.
        source_name: String,
        /// Service diagnostic.
        reason: String,
        /// Whether another attempt may succeed.
        transient: bool,
    },
    /// Extraction exceeded the configured timeout.
    #[error("Extraction of '{source_name}' timed out")]
    Timeout {
        /// Document identifier.
        source_name: String,
    },
}

impl crate::resilience::Retryable for ExtractionError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Service {
                transient: true,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Provenance {
        Provenance {
            source: "paper.pdf".into(),
            page_number: Some(1),
        }
    }

    #[test]
    fn table_summaries_use_html_when_present() {
        let table = Element::table(
            "a b\n1 2",
            Some("<table><tr><td>a</td></tr></table>".into()),
            origin(),
        );
        assert!(table.summarization_input().starts_with("<table>"));

        let plain = Element::table("a b\n1 2", None, origin());
        assert_eq!(plain.summarization_input(), "a b\n1 2");
    }

    #[test]
    fn image_bytes_are_base64_encoded() {
        let image = Element::image("image/jpeg", &[0xff, 0xd8, 0xff], origin());
        match image.payload() {
            Payload::Image { data_base64, .. } => assert_eq!(data_base64, "/9j/"),
            other => panic!("unexpected payload {other:?}"),
        }
        assert!(image.has_content());
        assert_eq!(image.text_content(), "");
    }

    #[test]
    fn elements_round_trip_through_json_with_nested_images() {
        let composite = Element::text("Intro", origin()).with_nested(vec![Element::image(
            "image/jpeg",
            b"jpg",
            origin(),
        )]);
        let json = serde_json::to_string(&composite).expect("serialize");
        let back: Element = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, composite);
        assert_eq!(back.nested()[0].kind(), ElementKind::Image);
    }
}
