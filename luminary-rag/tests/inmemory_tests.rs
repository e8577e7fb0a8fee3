//! Property tests for vector index ranking.

use luminary_rag::document::Metadata;
use luminary_rag::{
    InMemoryVectorIndex, IndexedChunk, MetadataFilter, PersistentVectorIndex, VectorIndex,
    cosine_similarity,
};
use proptest::prelude::*;
use proptest::strategy::ValueTree;
use serde_json::json;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map("non-zero embedding", |mut v| {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm < 1e-8 {
            return None;
        }
        for val in &mut v {
            *val /= norm;
        }
        Some(v)
    })
}

/// Generate a chunk belonging to one of three documents.
fn arb_chunk(dim: usize) -> impl Strategy<Value = IndexedChunk> {
    (0usize..3, 0usize..50, "[a-z ]{5,30}", arb_normalized_embedding(dim)).prop_map(
        |(doc, seq, text, embedding)| {
            let doc_id = format!("doc{doc}");
            let mut metadata = Metadata::new();
            metadata.insert("doc_id".into(), json!(doc_id));
            IndexedChunk {
                id: IndexedChunk::compose_id(&doc_id, seq),
                doc_id,
                sequence_index: seq,
                text,
                embedding,
                metadata,
            }
        },
    )
}

/// Chunks with pairwise distinct ids.
fn arb_chunks(dim: usize) -> impl Strategy<Value = Vec<IndexedChunk>> {
    proptest::collection::vec(arb_chunk(dim), 1..20).prop_map(|chunks| {
        let mut seen = std::collections::HashSet::new();
        chunks.into_iter().filter(|c| seen.insert(c.id.clone())).collect()
    })
}

/// For any set of indexed chunks, a query returns at most `k` matches ordered
/// by ascending cosine distance, and each distance is exactly one minus the
/// cosine similarity of the stored embedding, which is carried unchanged.
mod prop_index_ranking {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_ascending_and_bounded_by_k(
            chunks in arb_chunks(DIM),
            query in arb_normalized_embedding(DIM),
            k in 1usize..25,
        ) {
            let index = InMemoryVectorIndex::new();
            index.upsert(&chunks).unwrap();
            let results = index.query(&query, k, None).unwrap();

            prop_assert!(results.len() <= k);
            prop_assert_eq!(results.len(), k.min(chunks.len()));

            for window in results.windows(2) {
                prop_assert!(
                    window[0].distance <= window[1].distance,
                    "results not ascending: {} > {}",
                    window[0].distance,
                    window[1].distance,
                );
            }

            for m in &results {
                let stored = chunks.iter().find(|c| c.id == m.id).unwrap();
                prop_assert_eq!(m.similarity, cosine_similarity(&stored.embedding, &query));
                prop_assert_eq!(m.distance, 1.0 - m.similarity);
            }
        }

        #[test]
        fn filtered_results_stay_inside_the_document(
            chunks in arb_chunks(DIM),
            query in arb_normalized_embedding(DIM),
            doc in 0usize..3,
        ) {
            let index = InMemoryVectorIndex::new();
            index.upsert(&chunks).unwrap();
            let doc_id = format!("doc{doc}");
            let results = index.query(&query, 50, Some(&MetadataFilter::doc_id(&doc_id))).unwrap();

            let expected = chunks.iter().filter(|c| c.doc_id == doc_id).count();
            prop_assert_eq!(results.len(), expected);
            let id_prefix = format!("{doc_id}_");
            prop_assert!(results.iter().all(|m| m.id.starts_with(&id_prefix)));
        }
    }
}

/// The persistent index ranks exactly like the in-memory one before and
/// after a reopen.
#[test]
fn persistent_index_matches_in_memory_ranking() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vectors.json");

    let mut runner = proptest::test_runner::TestRunner::deterministic();
    let chunks = arb_chunks(8).new_tree(&mut runner).unwrap().current();
    let query = arb_normalized_embedding(8).new_tree(&mut runner).unwrap().current();

    let memory = InMemoryVectorIndex::new();
    memory.upsert(&chunks).unwrap();
    {
        let persistent = PersistentVectorIndex::open(&path).unwrap();
        persistent.upsert(&chunks).unwrap();
        assert_eq!(persistent.query(&query, 10, None).unwrap(), memory.query(&query, 10, None).unwrap());
    }

    let reopened = PersistentVectorIndex::open(&path).unwrap();
    assert_eq!(reopened.count().unwrap(), chunks.len());
    assert_eq!(reopened.query(&query, 10, None).unwrap(), memory.query(&query, 10, None).unwrap());
}
