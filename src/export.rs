//! JSON Lines export of extracted chunks for building evaluation datasets.
//!
//! Each record carries one text or table chunk, or one image, with an empty `gold_questions`
//! list for annotators to fill in.

use crate::classify::{classify, extract_images};
use crate::extraction::{DocumentSource, Element, ElementKind, ExtractionError, Extractor, Payload};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// One exported chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Fresh identifier for the record.
    pub chunk_id: Uuid,
    /// `text`, `table`, or `image`.
    pub modality: ElementKind,
    /// Source document identifier.
    pub source_pdf: String,
    /// Page of the chunk, when known.
    pub page_number: Option<u32>,
    /// Text content; `None` for images.
    pub raw_text: Option<String>,
    /// Base64 image bytes; `None` for text and tables.
    pub image_b64: Option<String>,
    /// Reference questions, filled in by annotators.
    pub gold_questions: Vec<String>,
}

impl ChunkRecord {
    fn from_element(element: &Element) -> Self {
        let (raw_text, image_b64) = match element.payload() {
            Payload::Image { data_base64, .. } => (None, Some(data_base64.clone())),
            _ => (Some(element.summarization_input().to_string()), None),
        };
        Self {
            chunk_id: Uuid::new_v4(),
            modality: element.kind(),
            source_pdf: element.provenance().source.clone(),
            page_number: element.provenance().page_number,
            raw_text,
            image_b64,
            gold_questions: Vec::new(),
        }
    }
}

/// Export failures.
#[derive(Debug, Error)]
pub enum ExportError {
    /// A document could not be extracted.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// Output file could not be written.
    #[error("Failed to write {path}: {source}")]
    Io {
        /// Output path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Record could not be serialized.
    #[error("Failed to serialize chunk record: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Records for the texts, tables, and nested images of `elements`, in that order.
pub fn chunk_records(elements: Vec<Element>) -> Vec<ChunkRecord> {
    let classified = classify(elements);
    let images = extract_images(&classified.texts);
    classified
        .texts
        .iter()
        .chain(&classified.tables)
        .filter(|element| element.has_content())
        .chain(&images)
        .map(ChunkRecord::from_element)
        .collect()
}

/// Append `records` to `path` as JSON Lines, creating the file when missing.
pub async fn append_jsonl(path: &Path, records: &[ChunkRecord]) -> Result<usize, ExportError> {
    let io_error = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut buffer = Vec::new();
    for record in records {
        serde_json::to_writer(&mut buffer, record)?;
        buffer.push(b'\n');
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(io_error)?;
    file.write_all(&buffer).await.map_err(io_error)?;
    file.flush().await.map_err(io_error)?;
    Ok(records.len())
}

/// Extract every source and append its chunks to `output`; returns the record count.
pub async fn export_documents(
    extractor: &dyn Extractor,
    sources: &[DocumentSource],
    output: &Path,
) -> Result<usize, ExportError> {
    let mut written = 0;
    for source in sources {
        let elements = extractor.extract(source).await?;
        let records = chunk_records(elements);
        written += append_jsonl(output, &records).await?;
        tracing::info!(
            source = %source.display_name(),
            records = records.len(),
            output = %output.display(),
            "Exported chunks"
        );
    }
    Ok(written)
}
