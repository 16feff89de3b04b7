//! Text chunking with overlap
//!
//! Splits cleaned page text into fixed-size windows that share a configured
//! overlap, recording verbatim byte offsets so chunks can be traced back to
//! (and reassembled into) the source text. Breaks are adjusted to UTF-8
//! character boundaries and, when possible, pulled back to nearby whitespace
//! so words are not split.

use crate::config::ChunkingConfig;
use blake3::Hasher;

/// A text chunk with its position in the source text
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// Verbatim slice of the source text
    pub text: String,

    /// Byte offset of the chunk start in the source text
    pub start_offset: usize,

    /// Byte offset one past the chunk end
    pub end_offset: usize,

    /// Chunk index within the page (0-based)
    pub index: usize,
}

/// Split text into overlapping chunks
///
/// Empty or whitespace-only input yields no chunks. A trailing remainder
/// shorter than the overlap still becomes its own chunk.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current_start = 0;
    let mut index = 0;

    while current_start < text.len() {
        let target_end = current_start + config.chunk_size;

        let chunk_end = if target_end >= text.len() {
            text.len()
        } else {
            find_break(text, current_start, target_end, config)
        };

        chunks.push(TextChunk {
            text: text[current_start..chunk_end].to_string(),
            start_offset: current_start,
            end_offset: chunk_end,
            index,
        });
        index += 1;

        if chunk_end >= text.len() {
            break;
        }

        let next_start = ensure_char_boundary(text, chunk_end - config.chunk_overlap);
        current_start = if next_start > current_start {
            next_start
        } else {
            chunk_end
        };
    }

    chunks
}

/// Pick a chunk end at or before `target`, preferring whitespace
///
/// The search never moves the end at or below `start + chunk_overlap`, so
/// the next chunk's start always advances.
fn find_break(text: &str, start: usize, target: usize, config: &ChunkingConfig) -> usize {
    let target = ensure_char_boundary(text, target);

    // Scan back over the last fifth of the window for a whitespace break
    let window = config.chunk_size / 5;
    let floor = start + config.chunk_overlap + 1;
    let search_start = ensure_char_boundary(text, target.saturating_sub(window).max(floor));

    if search_start < target {
        for (i, c) in text[search_start..target].char_indices().rev() {
            if c.is_whitespace() {
                let pos = search_start + i + c.len_utf8();
                if pos > floor && pos < target {
                    return pos;
                }
            }
        }
    }

    target
}

/// Ensure a position is on a valid UTF-8 character boundary
fn ensure_char_boundary(text: &str, pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    let mut adjusted = pos;
    while adjusted > 0 && !text.is_char_boundary(adjusted) {
        adjusted -= 1;
    }
    adjusted
}

/// Stable chunk id derived from the source URL, chunk index and content
///
/// Re-ingesting an unchanged page reproduces the same ids, so the index
/// overwrites entries in place instead of accumulating duplicates.
pub fn chunk_id(url: &str, index: usize, text: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(url.as_bytes());
    hasher.update(b"#");
    hasher.update(index.to_string().as_bytes());
    hasher.update(b"#");
    hasher.update(text.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Compute a stable hash for page content
pub fn compute_text_hash(text: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(text.as_bytes());
    hasher.finalize().to_hex().to_string()
}
