//! Vector index trait for storing and searching chunk embeddings.

use serde::{Deserialize, Serialize};

use crate::document::{IndexMatch, IndexedChunk, Metadata};
use crate::error::Result;

/// A conjunction of exact metadata matches.
///
/// A chunk matches when every `(key, value)` pair is present in its metadata
/// with an equal JSON value.
///
/// # Example
///
/// ```rust
/// use luminary_rag::MetadataFilter;
///
/// let filter = MetadataFilter::doc_id("d1");
/// assert_eq!(filter.get("doc_id"), Some(&serde_json::json!("d1")));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    conditions: Metadata,
}

impl MetadataFilter {
    /// An empty filter, matching every chunk.
    pub fn new() -> Self {
        Self::default()
    }

    /// A filter restricting a search to one document.
    pub fn doc_id(doc_id: impl Into<String>) -> Self {
        Self::new().with(crate::document::keys::DOC_ID, doc_id.into())
    }

    /// Add an exact-match condition.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.conditions.insert(key.into(), value.into());
        self
    }

    /// The required value for `key`, if constrained.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.conditions.get(key)
    }

    /// Whether `metadata` satisfies every condition.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions.iter().all(|(k, v)| metadata.get(k) == Some(v))
    }

    /// Whether the filter has no conditions.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// A store of chunk embeddings supporting nearest-neighbour search.
///
/// Calls are blocking and give read-your-writes consistency within one
/// process. Writers are expected to be serialised by the caller.
///
/// # Example
///
/// ```rust
/// use luminary_rag::{InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::new();
/// assert_eq!(index.count().unwrap(), 0);
/// assert!(index.query(&[1.0, 0.0], 5, None).unwrap().is_empty());
/// ```
pub trait VectorIndex: Send + Sync {
    /// Insert chunks, overwriting any existing chunk with the same id.
    ///
    /// Ids must be unique within one call.
    fn upsert(&self, chunks: &[IndexedChunk]) -> Result<()>;

    /// Return up to `k` chunks nearest to `embedding`, ascending by cosine
    /// distance, optionally restricted to chunks matching `filter`.
    fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<IndexMatch>>;

    /// Remove chunks by id. Unknown ids are ignored.
    fn delete_ids(&self, ids: &[&str]) -> Result<()>;

    /// Remove every chunk matching `filter` and return how many were removed.
    fn delete_where(&self, filter: &MetadataFilter) -> Result<usize>;

    /// Every chunk matching `filter`, ordered by chunk id.
    fn get_where(&self, filter: &MetadataFilter) -> Result<Vec<IndexedChunk>>;

    /// Total number of chunks.
    fn count(&self) -> Result<usize>;
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Cosine distance, `1 - cosine_similarity`.
///
/// Converting back with `1 - distance` recovers the similarity only up to
/// `f32` rounding, so ranked matches carry the similarity as well.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Sort key for a similarity: NaN ranks below every real score.
fn ranking_key(similarity: f32) -> f32 {
    if similarity.is_nan() { f32::NEG_INFINITY } else { similarity }
}

/// Rank `chunks` against `embedding` and keep the nearest `k`.
///
/// Ties are broken by chunk id so results are deterministic.
pub(crate) fn rank<'a, I>(
    chunks: I,
    embedding: &[f32],
    k: usize,
    filter: Option<&MetadataFilter>,
) -> Vec<IndexMatch>
where
    I: Iterator<Item = &'a IndexedChunk>,
{
    if k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<(f32, &IndexedChunk)> = chunks
        .filter(|chunk| filter.is_none_or(|f| f.matches(&chunk.metadata)))
        .map(|chunk| (cosine_similarity(&chunk.embedding, embedding), chunk))
        .collect();

    scored.sort_by(|a, b| {
        ranking_key(b.0).total_cmp(&ranking_key(a.0)).then_with(|| a.1.id.cmp(&b.1.id))
    });
    scored.truncate(k);

    scored
        .into_iter()
        .map(|(similarity, chunk)| IndexMatch {
            id: chunk.id.clone(),
            text: chunk.text.clone(),
            metadata: chunk.metadata.clone(),
            distance: 1.0 - similarity,
            similarity,
        })
        .collect()
}
