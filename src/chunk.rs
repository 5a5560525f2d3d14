//! Sliding-window text chunker.
//!
//! Splits extracted document text into [`Chunk`]s of at most `chunk_chars`
//! characters, where consecutive chunks share `overlap_chars` characters so a
//! passage cut at a window edge still appears whole in one of the two
//! neighbours.
//!
//! Windows are measured in `char`s, never bytes, so multi-byte text is never
//! split inside a UTF-8 sequence. Each chunk gets a random UUID plus a
//! SHA-256 hash of its text for embedding staleness detection.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Split text into overlapping windows. Returns chunks with contiguous
/// indices starting at 0, or no chunks for blank text.
///
/// `overlap_chars` must be smaller than `chunk_chars` (enforced by config
/// validation); a larger value is clamped so the window always advances.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    chunk_chars: usize,
    overlap_chars: usize,
) -> Vec<Chunk> {
    if text.trim().is_empty() || chunk_chars == 0 {
        return Vec::new();
    }

    let step = chunk_chars - overlap_chars.min(chunk_chars - 1);

    // Byte offset of every char start, plus the end of the string.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = boundaries.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut chunk_index: i64 = 0;

    loop {
        let end = (start + chunk_chars).min(total_chars);
        let piece = &text[boundaries[start]..boundaries[end]];
        chunks.push(make_chunk(document_id, chunk_index, piece));
        chunk_index += 1;

        if end == total_chars {
            break;
        }
        start += step;
    }

    chunks
}

pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn make_chunk(document_id: &str, index: i64, text: &str) -> Chunk {
    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash: hash_text(text),
    }
}
