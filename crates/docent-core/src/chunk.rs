//! Overlapping, boundary-aware page chunker.
//!
//! Splits the text of each extracted page into [`DocumentChunk`]s of roughly
//! `chunk_size` characters that overlap by `chunk_overlap` characters, so a
//! sentence cut at one boundary is still whole in the neighbouring chunk.
//!
//! Each chunk receives a deterministic identifier derived from its document,
//! page, index and the first 50 characters of its content. Re-ingesting an
//! unchanged corpus therefore overwrites the same index records.
//!
//! # Algorithm
//!
//! 1. Take a window of `chunk_size` characters starting at the cursor.
//! 2. If the window reaches the end of the text, the remainder is the chunk.
//! 3. Otherwise try the separators `"\n\n"`, `"\n"`, `". "`, `" "` in that
//!    order. For each, find its last occurrence inside the window; the first
//!    separator whose occurrence lies past the middle of the window wins and
//!    the chunk ends right after it. With no winner the window is hard-cut.
//! 4. Trim the chunk and keep it only if it has at least `min_chunk_size`
//!    characters.
//! 5. Move the cursor to `break_point - chunk_overlap` and repeat until the
//!    end of the text is reached or the cursor stops advancing.
//!
//! A higher-priority separator that sits before the midpoint loses to a
//! lower-priority one after it. Changing that would move chunk boundaries
//! and with them every chunk id already in the index.
//!
//! # Example
//!
//! ```rust
//! use docent_core::chunk::{split_text, ChunkParams};
//!
//! let params = ChunkParams::default();
//! let chunks = split_text("Deterministic content.", &params);
//! assert_eq!(chunks, vec!["Deterministic content.".to_string()]);
//! ```

use sha2::{Digest, Sha256};

use crate::models::{DocumentChunk, ExtractedPage};

/// Separators tried when looking for a natural break, highest priority first.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Number of content characters folded into a chunk id.
const ID_PREFIX_CHARS: usize = 50;

/// Chunking tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    /// Window length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive windows.
    pub chunk_overlap: usize,
    /// Trimmed chunks shorter than this are discarded.
    pub min_chunk_size: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 150,
            min_chunk_size: 50,
        }
    }
}

/// A kept chunk together with the character range of the window it came from.
///
/// `start..end` is measured in characters of the page text before trimming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Split page text into trimmed chunk strings.
///
/// Pure and deterministic: the same text and parameters always produce the
/// same list in the same order.
pub fn split_text(text: &str, params: &ChunkParams) -> Vec<String> {
    chunk_spans(text, params)
        .into_iter()
        .map(|span| span.text)
        .collect()
}

/// Split page text, keeping the window bounds of every kept chunk.
///
/// # Guarantees
///
/// - Blank text yields no chunks.
/// - Text shorter than `min_chunk_size` yields exactly one chunk when it is
///   not blank, so short pages still reach the index.
/// - Otherwise every returned chunk has at least `min_chunk_size` characters.
/// - Window starts strictly increase, so the loop always terminates.
pub fn chunk_spans(text: &str, params: &ChunkParams) -> Vec<ChunkSpan> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();

    if text.trim().is_empty() {
        return Vec::new();
    }
    if total < params.min_chunk_size {
        return vec![ChunkSpan {
            start: 0,
            end: total,
            text: text.trim().to_string(),
        }];
    }

    let chunk_size = params.chunk_size.max(1);
    let mut spans = Vec::new();
    let mut start = 0usize;

    while start < total {
        let end = start + chunk_size;
        let reaches_end = end >= total;

        let break_point = if reaches_end {
            total
        } else {
            find_break_point(&chars[start..end], chunk_size)
                .map(|offset| start + offset)
                .unwrap_or(end)
        };

        let candidate: String = chars[start..break_point].iter().collect();
        let trimmed = candidate.trim();
        if trimmed.chars().count() >= params.min_chunk_size {
            spans.push(ChunkSpan {
                start,
                end: break_point,
                text: trimmed.to_string(),
            });
        }

        if reaches_end {
            break;
        }

        let next = break_point.saturating_sub(params.chunk_overlap);
        if next <= start || next >= total {
            break;
        }
        start = next;
    }

    spans
}

/// Offset just past the winning separator inside `window`, if any qualifies.
fn find_break_point(window: &[char], chunk_size: usize) -> Option<usize> {
    for sep in SEPARATORS {
        let sep_chars: Vec<char> = sep.chars().collect();
        if let Some(pos) = rfind_chars(window, &sep_chars) {
            if pos * 2 > chunk_size {
                return Some(pos + sep_chars.len());
            }
        }
    }
    None
}

/// Index of the last occurrence of `needle` in `haystack`.
fn rfind_chars(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Chunk every text-bearing page of one document.
///
/// Pages flagged `has_text = false` are skipped. Chunk indices restart at 0 on
/// every page.
pub fn chunk_document(
    pages: &[ExtractedPage],
    source_document: &str,
    source_url: &str,
    params: &ChunkParams,
) -> Vec<DocumentChunk> {
    let mut chunks = Vec::new();

    for page in pages.iter().filter(|p| p.has_text) {
        for (idx, content) in split_text(&page.text, params).into_iter().enumerate() {
            let chunk_index = idx as u32;
            chunks.push(DocumentChunk {
                chunk_id: chunk_id(source_document, page.page_number, chunk_index, &content),
                content,
                source_document: source_document.to_string(),
                page_number: page.page_number,
                source_url: source_url.to_string(),
                chunk_index,
            });
        }
    }

    tracing::debug!(
        document = source_document,
        chunks = chunks.len(),
        pages = pages.iter().filter(|p| p.has_text).count(),
        "chunked document"
    );

    chunks
}

/// Stable chunk identifier: hex SHA-256 of
/// `"{document}:p{page}:c{index}:{first 50 chars}"`.
pub fn chunk_id(source_document: &str, page_number: u32, chunk_index: u32, content: &str) -> String {
    let prefix: String = content.chars().take(ID_PREFIX_CHARS).collect();
    let mut hasher = Sha256::new();
    hasher.update(format!("{source_document}:p{page_number}:c{chunk_index}:{prefix}").as_bytes());
    format!("{:x}", hasher.finalize())
}
