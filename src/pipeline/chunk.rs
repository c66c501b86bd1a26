//! Chunking: split document text into bounded segments for the backend.
//!
//! Each chunk is an exact substring of the input (`span` is its byte range),
//! capped at `max_chunk_chars` characters. Break points are chosen from the
//! end of the window backwards, in order of preference:
//!
//! 1. a paragraph break (`\n\n`) past the half-way mark
//! 2. a sentence end (`.`, `!`, `?` followed by whitespace) past the half-way mark
//! 3. the window edge itself, when it already falls between two words
//! 4. the last whitespace in the window
//! 5. the window edge (only for a single word longer than the cap)
//!
//! With `overlap_chars > 0` the next chunk starts that many characters
//! before the previous break, snapped forward to a word start, so facts
//! straddling a boundary appear whole in at least one chunk.

use crate::error::QuizGenError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// One generation unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Sequential identifier, starting at 0.
    pub id: usize,
    /// Position of the chunk in the document.
    pub ordinal: usize,
    pub text: String,
    /// Byte range of `text` within the source.
    pub span: Range<usize>,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Reject configurations that cannot make progress.
pub fn validate_chunk_config(max_chunk_chars: usize, overlap_chars: usize) -> Result<(), QuizGenError> {
    let invalid = |reason: &str| QuizGenError::InvalidChunkConfig {
        max_chunk_chars,
        overlap_chars,
        reason: reason.to_string(),
    };
    if max_chunk_chars == 0 {
        return Err(invalid("max_chunk_chars must be ≥ 1"));
    }
    if overlap_chars >= max_chunk_chars {
        return Err(invalid("overlap_chars must be smaller than max_chunk_chars"));
    }
    Ok(())
}

/// Split `text` into chunks of at most `max_chunk_chars` characters.
///
/// Deterministic: the same input and configuration always yield the same
/// sequence. Empty input yields no chunks.
pub fn chunk(text: &str, max_chunk_chars: usize, overlap_chars: usize) -> Result<Vec<Chunk>, QuizGenError> {
    validate_chunk_config(max_chunk_chars, overlap_chars)?;

    let len = text.len();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < len {
        let window_end = advance_chars(text, start, max_chunk_chars);
        let end = if window_end >= len {
            len
        } else {
            find_break(text, start, window_end, max_chunk_chars)
        };

        let ordinal = chunks.len();
        chunks.push(Chunk {
            id: ordinal,
            ordinal,
            text: text[start..end].to_string(),
            span: start..end,
        });

        if end >= len {
            break;
        }
        start = next_start(text, start, end, overlap_chars);
    }

    Ok(chunks)
}

static RE_SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[.!?]["'”’)\]]*\s+"#).unwrap());

/// Byte index `n` characters after `from`, clamped to the end of `text`.
fn advance_chars(text: &str, from: usize, n: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(n)
        .map(|(i, _)| from + i)
        .unwrap_or(text.len())
}

/// Byte index `n` characters before `from`, clamped to 0.
fn retreat_chars(text: &str, from: usize, n: usize) -> usize {
    if n == 0 {
        return from;
    }
    text[..from]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn find_break(text: &str, start: usize, window_end: usize, max_chunk_chars: usize) -> usize {
    let window = &text[start..window_end];
    let min_fill = advance_chars(text, start, max_chunk_chars / 2) - start;

    if let Some(p) = window.rfind("\n\n") {
        if p + 2 > min_fill {
            return start + p + 2;
        }
    }

    if let Some(m) = RE_SENTENCE_END
        .find_iter(window)
        .filter(|m| m.end() > min_fill)
        .last()
    {
        return start + m.end();
    }

    let at_word_gap = window.ends_with(char::is_whitespace)
        || text[window_end..].starts_with(char::is_whitespace);
    if at_word_gap {
        return window_end;
    }

    if let Some((i, c)) = window.char_indices().rev().find(|(_, c)| c.is_whitespace()) {
        return start + i + c.len_utf8();
    }

    // A single word longer than the cap: the cap wins.
    window_end
}

fn next_start(text: &str, start: usize, end: usize, overlap_chars: usize) -> usize {
    if overlap_chars == 0 {
        return end;
    }
    let back = retreat_chars(text, end, overlap_chars);
    let snapped = snap_to_word_start(text, back, end);
    if snapped <= start {
        end
    } else {
        snapped
    }
}

/// Move `at` forward to the start of the next word unless it already is one.
fn snap_to_word_start(text: &str, at: usize, limit: usize) -> usize {
    let prev_is_space = text[..at]
        .chars()
        .next_back()
        .is_none_or(char::is_whitespace);
    if prev_is_space {
        return at;
    }
    match text[at..limit].char_indices().find(|(_, c)| c.is_whitespace()) {
        Some((i, c)) => at + i + c.len_utf8(),
        None => limit,
    }
}
