//! Semantic splitting of oversized text blocks.
//!
//! Composite text elements are bounded in characters rather than tokens: the bound protects
//! the summarizer prompt, and character counts are stable across summarizer models. Splitting
//! itself is delegated to `semchunk-rs`, which prefers paragraph, sentence, and word
//! boundaries in that order.

use semchunk_rs::Chunker;
use std::sync::Arc;
use thiserror::Error;

type LengthCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Errors produced while splitting text.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Caller configured an impossible budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// Split `text` into segments of at most `max_characters` characters.
///
/// Returns an empty vector when the input is all whitespace and the trimmed text itself when it
/// already fits.
pub fn chunk_text(text: &str, max_characters: usize) -> Result<Vec<String>, ChunkingError> {
    if max_characters == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if char_counter()(trimmed) <= max_characters {
        return Ok(vec![trimmed.to_string()]);
    }
    Ok(chunk_text_with_counter(trimmed, max_characters, char_counter()))
}

fn char_counter() -> LengthCounter {
    Arc::new(|segment: &str| segment.chars().count())
}

fn chunk_text_with_counter(text: &str, chunk_size: usize, counter: LengthCounter) -> Vec<String> {
    let counter_for_chunker = counter.clone();
    let chunker = Chunker::new(
        chunk_size,
        Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
    );
    let mut chunks = Vec::new();
    for chunk in chunker.chunk(text) {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        if counter.as_ref()(chunk) <= chunk_size {
            chunks.push(chunk.to_string());
        } else {
            chunks.extend(split_to_budget(chunk, chunk_size, &counter));
        }
    }
    chunks
}

/// Re-split a chunk the splitter merged past `budget`, packing whole words greedily and breaking
/// single words that do not fit on their own. No text is dropped apart from the whitespace
/// between words.
fn split_to_budget(text: &str, budget: usize, counter: &LengthCounter) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if counter.as_ref()(&candidate) <= budget {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        if counter.as_ref()(word) <= budget {
            current = word.to_string();
        } else {
            let mut pieces = split_word(word, budget, counter);
            current = pieces.pop().unwrap_or_default();
            parts.extend(pieces);
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn split_word(word: &str, budget: usize, counter: &LengthCounter) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for ch in word.chars() {
        current.push(ch);
        if counter.as_ref()(&current) > budget && current.chars().count() > 1 {
            current.pop();
            pieces.push(std::mem::replace(&mut current, ch.to_string()));
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
