//! Document chunking strategies.
//!
//! Two strategies are kept side by side because they produce different chunk
//! boundaries and consumers depend on each:
//!
//! - [`ParagraphChunker`] (`paragraph_aware`) packs whole paragraphs and seeds
//!   each new chunk with trailing words of the previous one. The engine uses it
//!   for everything it indexes.
//! - [`FixedWindowChunker`] (`fixed_window`) slides a character window with a
//!   fixed character overlap. The document front end uses it for speed.
//!
//! [`line_grouped`] and [`clean_text`] serve the full-document analysis flows
//! and the front end respectively.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::RagError;

/// Characters of overlap budget per carried-over word.
///
/// `paragraph_aware` converts its character overlap into a word count once,
/// as `overlap / OVERLAP_CHARS_PER_WORD`.
pub const OVERLAP_CHARS_PER_WORD: usize = 5;

/// Paragraph separator recognised by `paragraph_aware`.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Default window for the front-end `fixed_window` chunker.
pub const FIXED_WINDOW_SIZE: usize = 1000;

/// Default character overlap for the front-end `fixed_window` chunker.
pub const FIXED_WINDOW_OVERLAP: usize = 200;

/// A strategy for splitting text into ordered chunk texts.
pub trait Chunker: Send + Sync {
    /// Split `text` into chunks, in document order.
    ///
    /// Returns an empty `Vec` for empty or whitespace-only text.
    fn chunk(&self, text: &str) -> Vec<String>;

    /// Which named strategy this chunker implements.
    fn strategy(&self) -> ChunkingStrategy;
}

/// The named chunking strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    /// Paragraph packing with word-based overlap.
    ParagraphAware,
    /// Character window with character overlap.
    FixedWindow,
}

impl ChunkingStrategy {
    /// Stable name used in configuration and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParagraphAware => "paragraph_aware",
            Self::FixedWindow => "fixed_window",
        }
    }

    /// Build a shareable chunker for this strategy.
    pub fn chunker(self, chunk_size: usize, overlap: usize) -> Arc<dyn Chunker> {
        match self {
            Self::ParagraphAware => Arc::new(ParagraphChunker::new(chunk_size, overlap)),
            Self::FixedWindow => Arc::new(FixedWindowChunker::new(chunk_size, overlap)),
        }
    }
}

impl fmt::Display for ChunkingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkingStrategy {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paragraph_aware" | "paragraph" => Ok(Self::ParagraphAware),
            "fixed_window" | "fixed" => Ok(Self::FixedWindow),
            other => Err(RagError::InvalidArgument(format!("unknown chunking strategy '{other}'"))),
        }
    }
}

/// Packs paragraphs into chunks of at most `chunk_size` characters.
///
/// A paragraph longer than `chunk_size` is emitted whole; it is never split.
///
/// # Example
///
/// ```rust
/// use luminary_rag::{Chunker, ParagraphChunker};
///
/// let chunker = ParagraphChunker::new(500, 100);
/// let chunks = chunker.chunk("Para one.\n\nPara two about termination.");
/// assert_eq!(chunks.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct ParagraphChunker {
    chunk_size: usize,
    overlap: usize,
}

impl ParagraphChunker {
    /// Create a new `ParagraphChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` — maximum number of characters per chunk
    /// * `overlap` — overlap budget in characters, carried as whole words
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self { chunk_size, overlap }
    }
}

impl Chunker for ParagraphChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        paragraph_aware(text, self.chunk_size, self.overlap)
    }

    fn strategy(&self) -> ChunkingStrategy {
        ChunkingStrategy::ParagraphAware
    }
}

/// Number of words `paragraph_aware` carries into the next chunk.
pub fn overlap_words(overlap: usize) -> usize {
    overlap / OVERLAP_CHARS_PER_WORD
}

/// The trailing-word seed carried from a closed chunk into the next one.
fn overlap_seed(closed: &str, seed_words: usize) -> String {
    let words: Vec<&str> = closed.split_whitespace().collect();
    if seed_words == 0 || words.len() <= seed_words {
        return String::new();
    }
    words[words.len() - seed_words..].join(" ")
}

/// Split `text` on paragraph boundaries and pack paragraphs into chunks.
///
/// A paragraph is appended while the running buffer plus the paragraph fits
/// in `chunk_size` characters. Otherwise the buffer is emitted and the next
/// chunk starts with the last `overlap / OVERLAP_CHARS_PER_WORD` words of the
/// emitted one, followed by a newline and the paragraph.
pub fn paragraph_aware(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let seed_words = overlap_words(overlap);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for paragraph in text.split(PARAGRAPH_SEPARATOR) {
        let paragraph_len = paragraph.chars().count();

        if current_len + paragraph_len <= chunk_size {
            current.push_str(paragraph);
            current.push_str(PARAGRAPH_SEPARATOR);
            current_len += paragraph_len + 2;
            continue;
        }

        if current.is_empty() {
            current = format!("{paragraph}{PARAGRAPH_SEPARATOR}");
        } else {
            push_trimmed(&mut chunks, &current);
            let seed = overlap_seed(&current, seed_words);
            current = format!("{seed}\n{paragraph}{PARAGRAPH_SEPARATOR}");
        }
        current_len = current.chars().count();
    }

    push_trimmed(&mut chunks, &current);
    chunks
}

fn push_trimmed(chunks: &mut Vec<String>, buffer: &str) {
    let trimmed = buffer.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Recover the paragraph sequence from `paragraph_aware` output.
///
/// Strips the overlap seed from every chunk after the first, then splits on
/// paragraph boundaries. `overlap` must be the value the chunks were produced
/// with.
pub fn reassemble_paragraphs(chunks: &[String], overlap: usize) -> Vec<String> {
    let seed_words = overlap_words(overlap);
    let mut paragraphs = Vec::new();

    for (i, chunk) in chunks.iter().enumerate() {
        let mut body = chunk.as_str();
        if i > 0 {
            let seed = overlap_seed(&chunks[i - 1], seed_words);
            if !seed.is_empty() {
                if let Some(rest) = body.strip_prefix(seed.as_str()) {
                    body = rest.strip_prefix('\n').unwrap_or(rest);
                }
            }
        }
        paragraphs.extend(
            body.split(PARAGRAPH_SEPARATOR)
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        );
    }

    paragraphs
}

/// Splits text into fixed character windows with a fixed character overlap.
///
/// # Example
///
/// ```rust
/// use luminary_rag::{Chunker, FixedWindowChunker};
///
/// let chunker = FixedWindowChunker::new(4, 1);
/// assert_eq!(chunker.chunk("abcdefg"), vec!["abcd", "defg"]);
/// ```
#[derive(Debug, Clone)]
pub struct FixedWindowChunker {
    chunk_size: usize,
    overlap: usize,
}

impl FixedWindowChunker {
    /// Create a new `FixedWindowChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` — number of characters per window
    /// * `overlap` — number of characters shared by consecutive windows
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self { chunk_size, overlap }
    }
}

impl Default for FixedWindowChunker {
    fn default() -> Self {
        Self::new(FIXED_WINDOW_SIZE, FIXED_WINDOW_OVERLAP)
    }
}

impl Chunker for FixedWindowChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        fixed_window(text, self.chunk_size, self.overlap)
    }

    fn strategy(&self) -> ChunkingStrategy {
        ChunkingStrategy::FixedWindow
    }
}

/// Slice `text` into `chunk_size`-character windows, each starting `overlap`
/// characters before the previous window ended.
///
/// Windows are trimmed and empty windows are dropped. The window always
/// advances by at least one character, even when `overlap >= chunk_size`.
pub fn fixed_window(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.trim().is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    // Byte offset of every char boundary, including the end of the string.
    let bounds: Vec<usize> =
        text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
    let char_len = bounds.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(char_len);
        push_trimmed(&mut chunks, &text[bounds[start]..bounds[end]]);
        if end >= char_len {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }

    chunks
}

/// Group lines into chunks of at most `chunk_size` characters.
///
/// Each line costs its length plus two; a line that does not fit starts a
/// new chunk. Used by the full-document analysis flows, which work on text
/// that has not been embedded.
pub fn line_grouped(text: &str, chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split('\n') {
        let line_len = line.chars().count();
        if current_len + line_len + 2 <= chunk_size {
            current.push_str(line);
            current.push_str(PARAGRAPH_SEPARATOR);
            current_len += line_len + 2;
        } else {
            push_trimmed(&mut chunks, &current);
            current = format!("{line}{PARAGRAPH_SEPARATOR}");
            current_len = line_len + 2;
        }
    }

    push_trimmed(&mut chunks, &current);
    chunks
}

/// Normalise extracted text: trim every line, collapse runs of blank lines
/// into a single paragraph break, collapse runs of spaces and trim the result.
///
/// Paragraph breaks survive, so the cleaned text still chunks by paragraph.
pub fn clean_text(text: &str) -> String {
    let mut joined = String::with_capacity(text.len());
    let mut pending_break = false;
    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            pending_break = !joined.is_empty();
            continue;
        }
        if !joined.is_empty() {
            joined.push_str(if pending_break { PARAGRAPH_SEPARATOR } else { "\n" });
        }
        joined.push_str(line);
        pending_break = false;
    }

    let mut cleaned = String::with_capacity(joined.len());
    let mut previous_space = false;
    for c in joined.chars() {
        if c == ' ' {
            if !previous_space {
                cleaned.push(c);
            }
            previous_space = true;
        } else {
            cleaned.push(c);
            previous_space = false;
        }
    }
    cleaned.trim().to_string()
}
