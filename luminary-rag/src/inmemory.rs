//! In-memory vector index using cosine distance.
//!
//! [`InMemoryVectorIndex`] keeps chunks in a `HashMap` behind a
//! `std::sync::RwLock`. It is the working set of
//! [`PersistentVectorIndex`](crate::persistent::PersistentVectorIndex) and is
//! used directly in tests.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::document::{IndexMatch, IndexedChunk};
use crate::error::{RagError, Result};
use crate::vectorindex::{MetadataFilter, VectorIndex, rank};

const BACKEND: &str = "InMemory";

/// An in-memory vector index.
///
/// # Example
///
/// ```rust
/// use luminary_rag::{InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::new();
/// index.delete_ids(&["missing"]).unwrap(); // no-op
/// assert_eq!(index.count().unwrap(), 0);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    chunks: RwLock<HashMap<String, IndexedChunk>>,
}

impl InMemoryVectorIndex {
    /// Create a new empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index pre-populated with `chunks`.
    pub fn from_chunks(chunks: impl IntoIterator<Item = IndexedChunk>) -> Self {
        let map = chunks.into_iter().map(|c| (c.id.clone(), c)).collect();
        Self { chunks: RwLock::new(map) }
    }

    /// A copy of every chunk, ordered by id.
    pub fn snapshot(&self) -> Result<Vec<IndexedChunk>> {
        let chunks = self.read()?;
        let mut all: Vec<IndexedChunk> = chunks.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    /// Replace the whole contents of the index.
    pub(crate) fn replace_all(&self, chunks: Vec<IndexedChunk>) -> Result<()> {
        let mut store = self.write()?;
        *store = chunks.into_iter().map(|c| (c.id.clone(), c)).collect();
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, IndexedChunk>>> {
        self.chunks.read().map_err(|e| RagError::index(BACKEND, format!("lock poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, IndexedChunk>>> {
        self.chunks.write().map_err(|e| RagError::index(BACKEND, format!("lock poisoned: {e}")))
    }
}

/// Reject a batch that repeats a chunk id.
pub(crate) fn ensure_unique_ids(chunks: &[IndexedChunk]) -> Result<()> {
    let mut seen = HashSet::with_capacity(chunks.len());
    for chunk in chunks {
        if !seen.insert(chunk.id.as_str()) {
            return Err(RagError::index(
                BACKEND,
                format!("chunk id '{}' appears more than once in one upsert", chunk.id),
            ));
        }
    }
    Ok(())
}

impl VectorIndex for InMemoryVectorIndex {
    fn upsert(&self, chunks: &[IndexedChunk]) -> Result<()> {
        ensure_unique_ids(chunks)?;
        let mut store = self.write()?;
        for chunk in chunks {
            store.insert(chunk.id.clone(), chunk.clone());
        }
        Ok(())
    }

    fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<IndexMatch>> {
        let store = self.read()?;
        Ok(rank(store.values(), embedding, k, filter))
    }

    fn delete_ids(&self, ids: &[&str]) -> Result<()> {
        let mut store = self.write()?;
        for id in ids {
            store.remove(*id);
        }
        Ok(())
    }

    fn delete_where(&self, filter: &MetadataFilter) -> Result<usize> {
        let mut store = self.write()?;
        let before = store.len();
        store.retain(|_, chunk| !filter.matches(&chunk.metadata));
        Ok(before - store.len())
    }

    fn get_where(&self, filter: &MetadataFilter) -> Result<Vec<IndexedChunk>> {
        let store = self.read()?;
        let mut matched: Vec<IndexedChunk> =
            store.values().filter(|c| filter.matches(&c.metadata)).cloned().collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matched)
    }

    fn count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::document::Metadata;

    fn chunk(id: &str, doc_id: &str, embedding: Vec<f32>) -> IndexedChunk {
        let mut metadata = Metadata::new();
        metadata.insert("doc_id".into(), json!(doc_id));
        IndexedChunk {
            id: id.to_string(),
            doc_id: doc_id.to_string(),
            sequence_index: 0,
            text: format!("text of {id}"),
            embedding,
            metadata,
        }
    }

    #[test]
    fn query_orders_by_ascending_distance() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(&[
                chunk("a", "d1", vec![1.0, 0.0]),
                chunk("b", "d1", vec![0.0, 1.0]),
                chunk("c", "d2", vec![0.7, 0.7]),
            ])
            .unwrap();

        let matches = index.query(&[1.0, 0.0], 3, None).unwrap();
        let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert!(matches.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn filter_scopes_query_to_one_document() {
        let index = InMemoryVectorIndex::new();
        index.upsert(&[chunk("a", "d1", vec![1.0, 0.0]), chunk("c", "d2", vec![1.0, 0.0])]).unwrap();

        let matches = index.query(&[1.0, 0.0], 10, Some(&MetadataFilter::doc_id("d2"))).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "c");
    }

    #[test]
    fn upsert_overwrites_existing_ids() {
        let index = InMemoryVectorIndex::new();
        index.upsert(&[chunk("a", "d1", vec![1.0, 0.0])]).unwrap();
        let mut replacement = chunk("a", "d1", vec![0.0, 1.0]);
        replacement.text = "replaced".into();
        index.upsert(&[replacement]).unwrap();

        assert_eq!(index.count().unwrap(), 1);
        assert_eq!(index.snapshot().unwrap()[0].text, "replaced");
    }

    #[test]
    fn duplicate_ids_in_one_call_are_rejected() {
        let index = InMemoryVectorIndex::new();
        let err = index
            .upsert(&[chunk("a", "d1", vec![1.0]), chunk("a", "d1", vec![1.0])])
            .unwrap_err();
        assert!(matches!(err, RagError::VectorIndex { .. }));
        assert_eq!(index.count().unwrap(), 0);
    }

    #[test]
    fn delete_where_reports_removed_count() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(&[
                chunk("d1_0", "d1", vec![1.0]),
                chunk("d1_1", "d1", vec![1.0]),
                chunk("d2_0", "d2", vec![1.0]),
            ])
            .unwrap();

        assert_eq!(index.get_where(&MetadataFilter::doc_id("d1")).unwrap().len(), 2);
        assert_eq!(index.delete_where(&MetadataFilter::doc_id("d1")).unwrap(), 2);
        assert_eq!(index.delete_where(&MetadataFilter::doc_id("d1")).unwrap(), 0);
        assert_eq!(index.count().unwrap(), 1);
    }

    #[test]
    fn zero_k_returns_nothing() {
        let index = InMemoryVectorIndex::from_chunks([chunk("a", "d1", vec![1.0])]);
        assert!(index.query(&[1.0], 0, None).unwrap().is_empty());
    }
}
