//! Partition extracted elements into summarization buckets.

use crate::extraction::{Element, ElementKind};

/// Elements split by declared kind.
#[derive(Debug, Default, Clone)]
pub struct Classified {
    /// Table elements, in input order.
    pub tables: Vec<Element>,
    /// Composite text elements, in input order.
    pub texts: Vec<Element>,
    /// Elements that belong to neither bucket (top-level images).
    pub unrecognized: Vec<Element>,
}

impl Classified {
    /// Total number of elements across all buckets.
    pub fn len(&self) -> usize {
        self.tables.len() + self.texts.len() + self.unrecognized.len()
    }

    /// Whether no element was classified.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split `elements` into tables and texts by their declared kind.
///
/// Images are only meaningful nested under a composite text element; a top-level image lands in
/// `unrecognized` with a warning.
pub fn classify(elements: Vec<Element>) -> Classified {
    let mut classified = Classified::default();
    for element in elements {
        match element.kind() {
            ElementKind::Table => classified.tables.push(element),
            ElementKind::Text => classified.texts.push(element),
            ElementKind::Image => {
                tracing::warn!(
                    source = %element.provenance().source,
                    page = ?element.provenance().page_number,
                    "Top-level image element is not classified"
                );
                classified.unrecognized.push(element);
            }
        }
    }
    tracing::debug!(
        texts = classified.texts.len(),
        tables = classified.tables.len(),
        unrecognized = classified.unrecognized.len(),
        "Classified elements"
    );
    classified
}

/// Collect the images embedded in composite text elements.
pub fn extract_images(elements: &[Element]) -> Vec<Element> {
    elements
        .iter()
        .filter(|element| element.kind() == ElementKind::Text)
        .flat_map(|element| element.nested())
        .filter(|nested| nested.kind() == ElementKind::Image && nested.has_content())
        .cloned()
        .collect()
}
