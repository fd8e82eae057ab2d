//! Sliding-window text chunker.
//!
//! Splits document text into overlapping word-window [`Passage`]s. `size`
//! and `overlap` are word counts; the window advances by `size - overlap`
//! words per step. Identical input and parameters always produce identical
//! output, which is what makes re-ingestion idempotent.

use crate::models::Passage;

/// Split text into overlapping passages of at most `size` words.
///
/// A document of `size` or fewer words yields exactly one passage holding
/// the whole text. Empty input yields an empty vec. Indices are assigned
/// sequentially from 0 and are always contiguous.
///
/// Tail policy: the final window may be shorter than `size`; the loop stops
/// after emitting the window that reaches the last word, so no stride
/// starting at or past the end is ever produced.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<Passage> {
    assert!(size > 0, "chunk size must be > 0");
    assert!(overlap < size, "overlap must be smaller than chunk size");

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    if words.len() <= size {
        return vec![Passage {
            index: 0,
            content: text.trim().to_string(),
            word_count: words.len(),
            embedding: None,
        }];
    }

    let step = size - overlap;
    let mut passages = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + size).min(words.len());
        passages.push(Passage {
            index: passages.len(),
            content: words[start..end].join(" "),
            word_count: end - start,
            embedding: None,
        });
        if start + size >= words.len() {
            break;
        }
        start += step;
    }

    passages
}
