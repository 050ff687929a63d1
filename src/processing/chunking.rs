//! Semantic chunking with a length budget and sliding overlap.
//!
//! - Length is measured in characters by default, mirroring a recursive character splitter
//!   with `chunk_size = 1000` and `chunk_overlap = 100`; `TEXT_SPLITTER_UNIT=tokens` switches
//!   to `cl100k_base` token counts via `tiktoken-rs`.
//! - Boundaries come from `semchunk-rs`, which prefers paragraph, then sentence, then word
//!   breaks before cutting mid-word.
//! - Overlap prepends whole trailing words of the previous chunk to the next one. Base chunks
//!   are cut at `chunk_size - overlap`, so the tail fits without trimming the chunk itself.

use crate::config::LengthUnit;
use semchunk_rs::Chunker;
use std::sync::Arc;
use tiktoken_rs::cl100k_base;

use super::types::ChunkingError;

type LengthCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Chunk text into semantic segments measured in `unit`.
///
/// - `chunk_size` is a hard upper bound on the length of each segment.
/// - `overlap` requests a sliding-window overlap between adjacent chunks; it is clamped to
///   `chunk_size - 1`.
///
/// Returns an empty vector when the input text is all whitespace.
pub(crate) fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    unit: LengthUnit,
) -> Result<Vec<String>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let counter = build_length_counter(unit);
    Ok(chunk_text_with_counter(text, chunk_size, overlap, counter))
}

/// Build the length counter for `unit`.
///
/// Token counting falls back to whitespace words when the BPE tables cannot be loaded, keeping
/// ingestion flowing with a slightly looser budget.
pub(crate) fn build_length_counter(unit: LengthUnit) -> LengthCounter {
    match unit {
        LengthUnit::Chars => Arc::new(|segment: &str| segment.chars().count()),
        LengthUnit::Tokens => match cl100k_base() {
            Ok(encoding) => {
                let encoding = Arc::new(encoding);
                Arc::new(move |segment: &str| encoding.encode_ordinary(segment).len())
            }
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    "Tokenizer unavailable; falling back to whitespace counter"
                );
                whitespace_counter()
            }
        },
    }
}

fn whitespace_counter() -> LengthCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}

fn chunk_text_with_counter(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    counter: LengthCounter,
) -> Vec<String> {
    let effective_overlap = overlap.min(chunk_size.saturating_sub(1));
    // Base chunks leave room for the overlap tail so the combined chunk never exceeds
    // `chunk_size`.
    let base_budget = chunk_size - effective_overlap;

    let counter_for_chunker = counter.clone();
    let chunker = Chunker::new(
        base_budget,
        Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
    );
    let base_chunks = chunker
        .chunk(text)
        .into_iter()
        .filter(|chunk| !chunk.trim().is_empty())
        .flat_map(|chunk| split_to_budget(&chunk, base_budget, &counter))
        .collect();
    apply_overlap(base_chunks, chunk_size, effective_overlap, &counter)
}

/// Split `chunk` into pieces no longer than `budget`.
///
/// semchunk occasionally returns chunks a few units over its budget once separators are
/// re-attached. Pieces end on whitespace where possible; a single word longer than the budget
/// is cut at character boundaries.
fn split_to_budget(chunk: &str, budget: usize, counter: &LengthCounter) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = chunk.trim();

    while !rest.is_empty() {
        if counter.as_ref()(rest) <= budget {
            pieces.push(rest.to_string());
            break;
        }
        let cut = longest_prefix_within(rest, budget, counter);
        pieces.push(rest[..cut].trim_end().to_string());
        rest = rest[cut..].trim_start();
    }

    pieces
}

/// Byte length of the longest prefix of `text` that fits `limit`, preferring word boundaries.
///
/// Always returns at least one character so splitting makes progress.
fn longest_prefix_within(text: &str, limit: usize, counter: &LengthCounter) -> usize {
    let word_ends = text
        .char_indices()
        .filter(|(_, ch)| ch.is_whitespace())
        .map(|(offset, _)| offset)
        .collect::<Vec<_>>();
    if let Some(end) = word_ends
        .into_iter()
        .rev()
        .find(|&end| end > 0 && counter.as_ref()(text[..end].trim_end()) <= limit)
    {
        return end;
    }

    let mut boundaries = text.char_indices().map(|(offset, _)| offset).skip(1);
    let first = boundaries.next().unwrap_or(text.len());
    boundaries
        .chain(std::iter::once(text.len()))
        .take_while(|&end| counter.as_ref()(&text[..end]) <= limit)
        .last()
        .unwrap_or(first)
}

/// Prepend a length-limited tail of the previous chunk to each chunk after the first.
fn apply_overlap(
    chunks: Vec<String>,
    chunk_size: usize,
    overlap: usize,
    counter: &LengthCounter,
) -> Vec<String> {
    if overlap == 0 || chunks.len() < 2 {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut previous: Option<String> = None;

    for current in chunks {
        let next = match previous.as_deref() {
            Some(prev) => build_overlapped_chunk(prev, &current, overlap, chunk_size, counter),
            None => current.clone(),
        };
        overlapped.push(next);
        previous = Some(current);
    }

    overlapped
}

/// Join a tail of `previous` onto `current`, shrinking only the tail until the result fits.
fn build_overlapped_chunk(
    previous: &str,
    current: &str,
    overlap: usize,
    chunk_size: usize,
    counter: &LengthCounter,
) -> String {
    let mut limit = overlap;
    while limit > 0 {
        let tail = word_suffix_within(previous, limit, counter);
        if tail.is_empty() {
            break;
        }
        let mut combined = String::with_capacity(tail.len() + current.len() + 1);
        combined.push_str(tail);
        if !ends_with_whitespace(tail) && !starts_with_whitespace(current) {
            combined.push(' ');
        }
        combined.push_str(current);
        if counter.as_ref()(&combined) <= chunk_size {
            return combined;
        }
        limit = counter.as_ref()(tail).min(limit).saturating_sub(1);
    }
    current.to_string()
}

/// Longest suffix of `text` starting at a word boundary whose length fits `limit`.
fn word_suffix_within<'a>(text: &'a str, limit: usize, counter: &LengthCounter) -> &'a str {
    let trimmed = text.trim();
    if counter.as_ref()(trimmed) <= limit {
        return trimmed;
    }

    trimmed
        .char_indices()
        .filter(|(_, ch)| ch.is_whitespace())
        .map(|(offset, ch)| trimmed[offset + ch.len_utf8()..].trim_start())
        .find(|candidate| !candidate.is_empty() && counter.as_ref()(candidate) <= limit)
        .unwrap_or("")
}

fn starts_with_whitespace(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_whitespace)
}

fn ends_with_whitespace(text: &str) -> bool {
    text.chars().next_back().is_some_and(char::is_whitespace)
}
