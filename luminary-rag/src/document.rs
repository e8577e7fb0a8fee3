//! Data types for documents, chunks, and search results.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Open key-value metadata attached to documents and chunks.
///
/// No schema is enforced at ingestion; specific keys are validated where they
/// are read.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Length of a content-derived document id, in hex characters.
pub const CONTENT_ID_LEN: usize = 16;

/// Metadata keys the engine writes on every chunk.
pub mod keys {
    /// Parent document id.
    pub const DOC_ID: &str = "doc_id";
    /// Parent document title.
    pub const TITLE: &str = "title";
    /// Position of the chunk inside its document.
    pub const CHUNK_INDEX: &str = "chunk_index";
    /// Chunk length in characters.
    pub const LENGTH: &str = "length";
}

/// Derive a stable document id from content.
///
/// Identical content always maps to the same id, which is what turns a
/// repeated ingestion of the same text into a duplicate rejection.
pub fn content_id(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    hash.chars().take(CONTENT_ID_LEN).collect()
}

/// Number of whitespace-separated words in `text`.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// A document submitted for ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewDocument {
    /// The full text content.
    pub content: String,
    /// Human-readable title.
    pub title: String,
    /// Caller-supplied metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// Explicit id; derived from the content when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
}

impl NewDocument {
    /// Create a document with no metadata and a content-derived id.
    pub fn new(content: impl Into<String>, title: impl Into<String>) -> Self {
        Self { content: content.into(), title: title.into(), metadata: Metadata::new(), doc_id: None }
    }

    /// Use an explicit document id instead of the content hash.
    pub fn with_id(mut self, doc_id: impl Into<String>) -> Self {
        self.doc_id = Some(doc_id.into());
        self
    }

    /// Attach one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The id this document will be stored under.
    pub fn resolved_id(&self) -> String {
        match &self.doc_id {
            Some(id) => id.clone(),
            None => content_id(&self.content),
        }
    }
}

/// Registry summary of an ingested document. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRecord {
    /// Unique document id.
    pub doc_id: String,
    /// Human-readable title.
    pub title: String,
    /// Caller-supplied metadata.
    pub metadata: Metadata,
    /// When the document was ingested.
    pub added_at: DateTime<Utc>,
    /// Number of chunks stored in the vector index.
    pub chunk_count: usize,
    /// Content length in characters.
    pub char_count: usize,
    /// Content length in words.
    pub word_count: usize,
}

/// Derived statistics reported by `get_document`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentStats {
    /// Number of chunks.
    pub chunks: usize,
    /// Number of characters.
    pub characters: usize,
    /// Number of words.
    pub words: usize,
}

impl DocumentRecord {
    /// Statistics view of this record.
    pub fn stats(&self) -> DocumentStats {
        DocumentStats { chunks: self.chunk_count, characters: self.char_count, words: self.word_count }
    }
}

/// A registered document together with its raw content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredDocument {
    /// Registry summary.
    #[serde(flatten)]
    pub record: DocumentRecord,
    /// Raw content as ingested.
    pub content: String,
}

/// One row of `list_documents`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentSummary {
    /// Document id.
    pub doc_id: String,
    /// Title.
    pub title: String,
    /// Word count.
    pub words: usize,
    /// Chunk count.
    pub chunks: usize,
    /// Ingestion time.
    pub added_at: DateTime<Utc>,
    /// Caller-supplied metadata.
    pub metadata: Metadata,
}

impl From<&DocumentRecord> for DocumentSummary {
    fn from(record: &DocumentRecord) -> Self {
        Self {
            doc_id: record.doc_id.clone(),
            title: record.title.clone(),
            words: record.word_count,
            chunks: record.chunk_count,
            added_at: record.added_at,
            metadata: record.metadata.clone(),
        }
    }
}

/// A chunk as stored in the vector index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedChunk {
    /// Globally unique id, `{doc_id}_{sequence_index}`.
    pub id: String,
    /// Parent document id.
    pub doc_id: String,
    /// Position within the parent document.
    pub sequence_index: usize,
    /// Chunk text.
    pub text: String,
    /// Embedding produced at ingestion.
    pub embedding: Vec<f32>,
    /// Document metadata plus `doc_id`, `title`, `chunk_index` and `length`.
    pub metadata: Metadata,
}

impl IndexedChunk {
    /// Compose the id of the chunk at `sequence_index` in `doc_id`.
    pub fn compose_id(doc_id: &str, sequence_index: usize) -> String {
        format!("{doc_id}_{sequence_index}")
    }
}

/// A raw nearest-neighbour match returned by a vector index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexMatch {
    /// Chunk id.
    pub id: String,
    /// Chunk text.
    pub text: String,
    /// Chunk metadata.
    pub metadata: Metadata,
    /// Cosine distance to the query, `1 - similarity`.
    pub distance: f32,
    /// Cosine similarity to the query, as computed.
    pub similarity: f32,
}

/// A ranked chunk returned by `search`.
///
/// `similarity` is the cosine similarity between query and chunk embeddings,
/// carried from the index unchanged rather than recovered from the distance.
/// It lies in `[-1, 1]`, and in `[0, 1]` for embedders that only produce
/// non-negative components.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    /// Chunk id.
    pub chunk_id: String,
    /// Parent document id.
    pub doc_id: String,
    /// Parent document title.
    pub doc_title: String,
    /// Chunk text.
    pub text: String,
    /// Cosine similarity to the query.
    pub similarity: f32,
}

/// The response of a chunk-level search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResponse {
    /// The query text.
    pub query: String,
    /// Hits ordered by non-increasing similarity.
    pub results: Vec<SearchHit>,
    /// Number of chunks in the index when the search ran.
    pub total_searched: usize,
}

/// Search hits aggregated under their parent document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentGroup {
    /// Document id.
    pub doc_id: String,
    /// Document title.
    pub title: String,
    /// Best similarity among this document's hits.
    pub max_similarity: f32,
    /// Number of hits for this document.
    pub chunk_count: usize,
    /// The hits themselves, each with its own similarity.
    pub top_chunks: Vec<SearchHit>,
}

/// Engine-wide counters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Statistics {
    /// Registered documents.
    pub total_documents: usize,
    /// Chunks in the vector index.
    pub total_chunks: usize,
    /// Sum of word counts across registered documents.
    pub total_words: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_id_is_stable_and_truncated() {
        let a = content_id("Para one.\n\nPara two.");
        let b = content_id("Para one.\n\nPara two.");
        assert_eq!(a, b);
        assert_eq!(a.len(), CONTENT_ID_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, content_id("Para one."));
    }

    #[test]
    fn explicit_id_wins_over_content_hash() {
        let doc = NewDocument::new("text", "T").with_id("d1");
        assert_eq!(doc.resolved_id(), "d1");
        assert_eq!(NewDocument::new("text", "T").resolved_id(), content_id("text"));
    }

    #[test]
    fn word_count_splits_on_any_whitespace() {
        assert_eq!(word_count("  a\tb\n\nc  "), 3);
        assert_eq!(word_count(""), 0);
    }
}
