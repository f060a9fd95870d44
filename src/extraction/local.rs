//! In-process PDF extractor built on `lopdf`.
//!
//! This adapter reads the text layer page by page and pulls embedded JPEG images out of each
//! page's resources. It performs no layout analysis, so it never reports tables; deployments
//! that need tables point `EXTRACTOR_PROVIDER` at a partition service instead.

use super::compose::{Block, ChunkingOptions, LocatedBlock, compose_by_title};
use super::types::{DocumentSource, Element, ExtractionError};
use super::Extractor;
use crate::config::ExtractionStrategy;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use lopdf::Document;

const TITLE_MAX_CHARS: usize = 80;

/// In-process PDF extractor reading the text layer and embedded JPEG images.
pub struct LocalPdfExtractor {
    options: ChunkingOptions,
    extract_images: bool,
    strategy: ExtractionStrategy,
}

impl LocalPdfExtractor {
    /// Construct an extractor with explicit chunking bounds.
    pub fn new(
        options: ChunkingOptions,
        extract_images: bool,
        strategy: ExtractionStrategy,
    ) -> Self {
        if strategy == ExtractionStrategy::HiRes {
            tracing::debug!("Local extractor reads the text layer only; hi_res treated as fast");
        }
        Self {
            options,
            extract_images,
            strategy,
        }
    }
}

#[async_trait]
impl Extractor for LocalPdfExtractor {
    async fn extract(&self, source: &DocumentSource) -> Result<Vec<Element>, ExtractionError> {
        let source_name = source.display_name();
        let data = source.load_pdf().await?;
        let extract_images = self.extract_images;
        let options = self.options;

        tracing::debug!(
            source = %source_name,
            bytes = data.len(),
            strategy = self.strategy.as_str(),
            extract_images,
            "Extracting PDF locally"
        );

        let name_for_task = source_name.clone();
        let blocks = tokio::task::spawn_blocking(move || {
            read_blocks(&name_for_task, &data, extract_images)
        })
        .await
        .map_err(|error| ExtractionError::Corrupt {
            source_name: source_name.clone(),
            reason: format!("extraction task panicked: {error}"),
        })??;

        let elements = compose_by_title(&source_name, blocks, &options);
        tracing::info!(
            source = %source_name,
            elements = elements.len(),
            "PDF extracted"
        );
        Ok(elements)
    }

    fn name(&self) -> &str {
        "local"
    }
}

fn read_blocks(
    source_name: &str,
    data: &[u8],
    extract_images: bool,
) -> Result<Vec<LocatedBlock>, ExtractionError> {
    let document = Document::load_mem(data).map_err(|error| ExtractionError::Corrupt {
        source_name: source_name.to_string(),
        reason: error.to_string(),
    })?;

    let mut blocks = Vec::new();
    for (page_number, page_id) in document.get_pages() {
        match document.extract_text(&[page_number]) {
            Ok(text) => {
                for block in split_page_text(&text) {
                    blocks.push(LocatedBlock {
                        block,
                        page_number: Some(page_number),
                    });
                }
            }
            Err(error) => {
                tracing::warn!(
                    source = source_name,
                    page = page_number,
                    error = %error,
                    "Failed to read page text; continuing"
                );
            }
        }

        if !extract_images {
            continue;
        }
        match document.get_page_images(page_id) {
            Ok(images) => {
                for image in images {
                    let mime_type = image
                        .filters
                        .as_deref()
                        .and_then(|filters| filters.iter().find_map(|f| mime_for_filter(f)));
                    let Some(mime_type) = mime_type else {
                        tracing::debug!(
                            source = source_name,
                            page = page_number,
                            filters = ?image.filters,
                            "Skipping image without a directly embeddable encoding"
                        );
                        continue;
                    };
                    if image.content.is_empty() {
                        continue;
                    }
                    blocks.push(LocatedBlock {
                        block: Block::Image {
                            mime_type: mime_type.to_string(),
                            data_base64: STANDARD.encode(image.content),
                        },
                        page_number: Some(page_number),
                    });
                }
            }
            Err(error) => {
                tracing::debug!(
                    source = source_name,
                    page = page_number,
                    error = %error,
                    "No readable images on page"
                );
            }
        }
    }

    Ok(blocks)
}

fn mime_for_filter(filter: &str) -> Option<&'static str> {
    match filter {
        "DCTDecode" => Some("image/jpeg"),
        "JPXDecode" => Some("image/jp2"),
        _ => None,
    }
}

/// Split a page's text layer into paragraphs; short single-line paragraphs without terminal
/// punctuation are treated as titles.
fn split_page_text(text: &str) -> Vec<Block> {
    let normalized = text.replace("\r\n", "\n");
    let mut blocks = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();

    for line in normalized.lines() {
        let line = line.trim();
        if line.is_empty() {
            close_paragraph(&mut paragraph, &mut blocks);
        } else {
            paragraph.push(line);
        }
    }
    close_paragraph(&mut paragraph, &mut blocks);
    blocks
}

fn close_paragraph(paragraph: &mut Vec<&str>, blocks: &mut Vec<Block>) {
    if paragraph.is_empty() {
        return;
    }
    let single_line = paragraph.len() == 1;
    let joined = paragraph.join(" ");
    paragraph.clear();
    if single_line && looks_like_title(&joined) {
        blocks.push(Block::Title(joined));
    } else {
        blocks.push(Block::Narrative(joined));
    }
}

fn looks_like_title(line: &str) -> bool {
    let length = line.chars().count();
    length > 0
        && length <= TITLE_MAX_CHARS
        && !line.ends_with(['.', ',', ';', ':', '!', '?'])
        && line.chars().any(char::is_alphabetic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ElementKind;
    use lopdf::content::{Content, Operation};
    use lopdf::{Object, Stream, dictionary};

    fn one_page_pdf(lines: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
        ];
        for line in lines {
            operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
            operations.push(Operation::new("Td", vec![0.into(), (-16).into()]));
        }
        operations.push(Operation::new("ET", vec![]));
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("save pdf");
        bytes
    }

    #[tokio::test]
    async fn text_layer_becomes_one_composite_text_element() {
        let extractor =
            LocalPdfExtractor::new(ChunkingOptions::default(), true, ExtractionStrategy::Fast);
        let source = DocumentSource::Bytes {
            name: Some("report.pdf".into()),
            data: one_page_pdf(&["Quarterly Report", "Revenue grew 12% in the third quarter."]),
        };

        let elements = extractor.extract(&source).await.expect("extract");

        assert_eq!(elements.len(), 1);
        let element = &elements[0];
        assert_eq!(element.kind(), ElementKind::Text);
        assert_eq!(element.provenance().page_number, Some(1));
        assert_eq!(element.provenance().source, "report.pdf");
        let text = element.text_content();
        assert!(text.contains("Quarterly Report"), "text: {text}");
        assert!(text.contains("Revenue grew 12% in the third quarter."), "text: {text}");
        assert!(element.nested().is_empty());
    }

    #[test]
    fn page_text_splits_into_titles_and_paragraphs() {
        let text = "1 Introduction\n\nAttention is all you need.\nIt replaces recurrence.\n\n";
        let blocks = split_page_text(text);
        assert_eq!(
            blocks,
            vec![
                Block::Title("1 Introduction".into()),
                Block::Narrative("Attention is all you need. It replaces recurrence.".into()),
            ]
        );
    }

    #[test]
    fn only_jpeg_like_filters_are_embeddable() {
        assert_eq!(mime_for_filter("DCTDecode"), Some("image/jpeg"));
        assert_eq!(mime_for_filter("FlateDecode"), None);
    }

    #[tokio::test]
    async fn corrupt_pdf_is_rejected_with_typed_error() {
        let extractor =
            LocalPdfExtractor::new(ChunkingOptions::default(), true, ExtractionStrategy::Fast);
        let source = DocumentSource::Bytes {
            name: Some("broken.pdf".into()),
            data: b"%PDF-1.4\nthis is not a real pdf".to_vec(),
        };
        let error = extractor.extract(&source).await.unwrap_err();
        assert!(matches!(error, ExtractionError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn non_pdf_upload_is_unsupported() {
        let extractor =
            LocalPdfExtractor::new(ChunkingOptions::default(), false, ExtractionStrategy::Fast);
        let source = DocumentSource::Bytes {
            name: Some("notes.txt".into()),
            data: b"plain text".to_vec(),
        };
        let error = extractor.extract(&source).await.unwrap_err();
        assert!(matches!(error, ExtractionError::UnsupportedInput { .. }));
    }
}
