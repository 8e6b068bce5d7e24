//! Overlap-aware sliding-window text chunker.
//!
//! Splits extracted document text into passages of roughly `target_chars`
//! characters, each overlapping the previous by `overlap_chars`. When a
//! window does not reach the end of the text, the last portion of the
//! window is searched backwards for a sentence terminator or line break;
//! if one falls past 70% of the window, the chunk is cut there instead of
//! mid-sentence.
//!
//! Chunking is a pure function of its inputs: the same text and parameters
//! always produce the same passages, and chunk ids derived from them are
//! stable across re-chunking.

use crate::error::{Error, Result};
use crate::models::{chunk_id, Chunk, Document};

/// Fragments shorter than this (after trimming) are dropped, not stored.
const MIN_CHUNK_CHARS: usize = 50;

/// Fraction of the window past which a structural break is preferred over
/// a raw character cut.
const BOUNDARY_FRACTION_NUM: usize = 7;
const BOUNDARY_FRACTION_DEN: usize = 10;

/// Split text into overlapping passages.
///
/// Returns an empty vector for empty text. `overlap_chars >= target_chars`
/// is a configuration error and is rejected before any scanning happens.
pub fn chunk_text(text: &str, target_chars: usize, overlap_chars: usize) -> Result<Vec<String>> {
    if target_chars == 0 || overlap_chars >= target_chars {
        return Err(Error::Validation(format!(
            "overlap ({}) must be smaller than target chunk size ({})",
            overlap_chars, target_chars
        )));
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Ok(Vec::new());
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let end = (start + target_chars).min(chars.len());
        let window = end - start;
        let mut cut = end;

        // Prefer a sentence or line boundary over a mid-sentence cut, but
        // only when one exists past 70% of this window.
        if end < chars.len() {
            if let Some(pos) = chars[start..end]
                .iter()
                .rposition(|c| matches!(c, '.' | '!' | '?' | '\n'))
            {
                if (pos + 1) * BOUNDARY_FRACTION_DEN > window * BOUNDARY_FRACTION_NUM {
                    cut = start + pos + 1;
                }
            }
        }

        let piece: String = chars[start..cut].iter().collect();
        let trimmed = piece.trim();
        if trimmed.chars().count() >= MIN_CHUNK_CHARS {
            chunks.push(trimmed.to_string());
        }

        if end == chars.len() {
            break;
        }
        // The next window starts from the raw window end, not the snapped
        // cut, so overlap is measured against the full stride.
        start = end - overlap_chars;
    }

    Ok(chunks)
}

/// Chunk a document's extracted text into [`Chunk`] records carrying the
/// document's title and source reference.
pub fn chunk_document(
    doc: &Document,
    text: &str,
    target_chars: usize,
    overlap_chars: usize,
) -> Result<Vec<Chunk>> {
    let pieces = chunk_text(text, target_chars, overlap_chars)?;
    Ok(pieces
        .into_iter()
        .enumerate()
        .map(|(index, content)| Chunk {
            id: chunk_id(&doc.id, index),
            document_id: doc.id.clone(),
            chunk_index: index,
            content,
            title: doc.title.clone(),
            source_ref: doc.source_ref.clone(),
        })
        .collect())
}
