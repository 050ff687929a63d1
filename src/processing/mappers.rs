//! Chunk preparation helpers.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use time::OffsetDateTime;

/// Compute a deterministic SHA-256 hash for the chunk text.
pub(crate) fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Remove blank and duplicate chunks within a document, keeping the first occurrence.
///
/// Duplicates are detected by content hash; returns the kept chunks and the number skipped.
pub(crate) fn dedupe_chunks(chunks: Vec<String>) -> (Vec<String>, usize) {
    let mut seen = HashSet::new();
    let mut prepared = Vec::new();
    let mut skipped = 0;

    for text in chunks {
        if text.trim().is_empty() {
            continue;
        }
        if seen.insert(compute_chunk_hash(&text)) {
            prepared.push(text);
        } else {
            skipped += 1;
        }
    }

    (prepared, skipped)
}

/// Current timestamp formatted as RFC 3339.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_hash_is_stable() {
        assert_eq!(compute_chunk_hash("abc"), compute_chunk_hash("abc"));
        assert_ne!(compute_chunk_hash("abc"), compute_chunk_hash("abd"));
        assert_eq!(compute_chunk_hash("").len(), 64);
    }

    #[test]
    fn dedupe_keeps_first_occurrence_and_counts_skips() {
        let (prepared, skipped) = dedupe_chunks(vec![
            "alpha".into(),
            "beta".into(),
            "  ".into(),
            "alpha".into(),
        ]);
        assert_eq!(prepared, vec!["alpha", "beta"]);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn timestamp_is_rfc3339_like() {
        let timestamp = current_timestamp_rfc3339();
        assert!(timestamp.contains('T'));
        assert!(timestamp.ends_with('Z'));
    }
}
