//! By-title composition of flat layout blocks into composite elements.
//!
//! Extractor adapters report a flat stream of blocks (titles, paragraphs, tables, images).
//! This module groups that stream into the element model the rest of the pipeline expects:
//! consecutive narrative blocks become one composite text element, a title starts a new
//! section, tables stand alone, and images are nested under the composite element they appear
//! in. Images are never emitted at the top level.

use super::chunking::chunk_text;
use super::types::{Element, Provenance};

/// Size bounds applied while composing sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingOptions {
    /// Hard upper bound on characters per composite element.
    pub max_characters: usize,
    /// Sections shorter than this absorb the next section instead of closing at a title.
    pub combine_under_chars: usize,
    /// Soft bound: once exceeded, the next block starts a new element.
    pub new_after_chars: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            max_characters: 10_000,
            combine_under_chars: 2_000,
            new_after_chars: 6_000,
        }
    }
}

/// One layout block reported by an extractor.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Section heading.
    Title(String),
    /// Paragraph, list item, caption, or other running text.
    Narrative(String),
    /// Table with optional HTML rendering.
    Table {
        /// Cell text.
        text: String,
        /// HTML rendering.
        html: Option<String>,
    },
    /// Encoded image.
    Image {
        /// MIME type.
        mime_type: String,
        /// Base64 image bytes.
        data_base64: String,
    },
}

/// A block together with the page it was found on.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedBlock {
    /// Layout block.
    pub block: Block,
    /// 1-based page number.
    pub page_number: Option<u32>,
}

#[derive(Default)]
struct Section {
    pieces: Vec<String>,
    images: Vec<Element>,
    length: usize,
    page_number: Option<u32>,
}

impl Section {
    fn is_empty(&self) -> bool {
        self.pieces.is_empty() && self.images.is_empty()
    }

    fn push_text(&mut self, text: String, page_number: Option<u32>) {
        if self.pieces.is_empty() && self.page_number.is_none() {
            self.page_number = page_number;
        }
        self.length += text.chars().count();
        self.pieces.push(text);
    }
}

/// Group `blocks` from one document into composite text, table, and nested image elements.
pub fn compose_by_title(
    source: &str,
    blocks: Vec<LocatedBlock>,
    options: &ChunkingOptions,
) -> Vec<Element> {
    let mut elements = Vec::new();
    let mut section = Section::default();

    for LocatedBlock { block, page_number } in blocks {
        match block {
            Block::Title(text) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    continue;
                }
                if !section.is_empty() && section.length >= options.combine_under_chars {
                    flush(source, &mut section, options, &mut elements);
                }
                section.push_text(text, page_number);
            }
            Block::Narrative(text) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    continue;
                }
                let incoming = text.chars().count();
                if !section.pieces.is_empty()
                    && section.length + incoming > options.new_after_chars
                {
                    flush(source, &mut section, options, &mut elements);
                }
                section.push_text(text, page_number);
            }
            Block::Table { text, html } => {
                flush(source, &mut section, options, &mut elements);
                if text.trim().is_empty() && html.as_deref().is_none_or(|h| h.trim().is_empty()) {
                    continue;
                }
                elements.push(Element::table(
                    text.trim(),
                    html,
                    provenance(source, page_number),
                ));
            }
            Block::Image {
                mime_type,
                data_base64,
            } => {
                if section.pieces.is_empty() && section.page_number.is_none() {
                    section.page_number = page_number;
                }
                section.images.push(Element::image_base64(
                    mime_type,
                    data_base64,
                    provenance(source, page_number),
                ));
            }
        }
    }
    flush(source, &mut section, options, &mut elements);
    elements
}

fn flush(
    source: &str,
    section: &mut Section,
    options: &ChunkingOptions,
    elements: &mut Vec<Element>,
) {
    if section.is_empty() {
        return;
    }
    let Section {
        pieces,
        images,
        page_number,
        ..
    } = std::mem::take(section);
    let joined = pieces.join("\n\n");

    let mut parts = match chunk_text(&joined, options.max_characters) {
        Ok(parts) => parts,
        Err(error) => {
            tracing::warn!(error = %error, source, "Invalid chunk bound; keeping section whole");
            vec![joined]
        }
    };
    if parts.is_empty() {
        // Image-only section: keep a composite shell so the images stay reachable.
        parts.push(String::new());
    }

    let mut images = Some(images);
    for part in parts {
        let element = Element::text(part, provenance(source, page_number));
        let element = match images.take() {
            Some(nested) if !nested.is_empty() => element.with_nested(nested),
            _ => element,
        };
        elements.push(element);
    }
}

fn provenance(source: &str, page_number: Option<u32>) -> Provenance {
    Provenance {
        source: source.to_string(),
        page_number,
    }
}
