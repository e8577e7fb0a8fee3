//! Retrieval engine.
//!
//! [`RagEngine`] owns the embedder, the vector index, the document registry,
//! the chunker and the generation capability, and implements ingestion,
//! search, grouped search, document-scoped question answering, listing,
//! deletion and statistics on top of them.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use luminary_rag::{AddOutcome, HashingEmbeddingProvider, NewDocument, RagConfig, RagEngine};
//!
//! let engine = RagEngine::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(HashingEmbeddingProvider::new(64)))
//!     .build()?;
//!
//! let outcome = engine.add_document(
//!     NewDocument::new("Either party may terminate with 30 days notice.", "Lease").with_id("d1"),
//! )?;
//! assert!(matches!(outcome, AddOutcome::Added { chunks_created: 1, .. }));
//!
//! let response = engine.search("terminate notice", 5, None)?;
//! assert_eq!(response.results[0].doc_id, "d1");
//! # Ok::<(), luminary_rag::RagError>(())
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::chunking::{Chunker, ParagraphChunker};
use crate::config::RagConfig;
use crate::document::{
    DocumentGroup, DocumentRecord, DocumentSummary, IndexMatch, IndexedChunk, NewDocument,
    SearchHit, SearchResponse, Statistics, StoredDocument, keys, word_count,
};
use crate::embedding::{EmbeddingProvider, validate_batch};
use crate::error::{RagError, Result};
use crate::generation::{DisabledGenerator, GenerationParams, TextGenerator};
use crate::inmemory::InMemoryVectorIndex;
use crate::outcome::{AddOutcome, AnswerOutcome, Deleted, Lookup};
use crate::persistent::PersistentVectorIndex;
use crate::registry::{DocumentRegistry, FileRegistry, InMemoryRegistry, validate_doc_id};
use crate::vectorindex::{MetadataFilter, VectorIndex};

/// Grouped search retrieves this many chunks per requested document.
pub const GROUPING_OVERSAMPLE: usize = 2;

/// Title reported for hits whose document has no recorded title.
const UNKNOWN_TITLE: &str = "Unknown";

/// Build the prompt for a document-scoped question.
pub fn answer_prompt(title: &str, context: &str, question: &str) -> String {
    format!(
        "Based on the following document excerpts, answer the question.\n\n\
         Document: {title}\n\n\
         Context:\n{context}\n\n\
         Question: {question}\n\n\
         Provide a clear, accurate answer based only on the context provided. \
         If the answer cannot be found in the context, say so.\n\n\
         Answer:"
    )
}

/// The retrieval engine.
///
/// All operations are blocking. Share one engine behind an `Arc`; use
/// [`RagService`](crate::service::RagService) from async code.
pub struct RagEngine {
    pub(crate) config: RagConfig,
    pub(crate) embedder: Arc<dyn EmbeddingProvider>,
    pub(crate) index: Arc<dyn VectorIndex>,
    pub(crate) registry: Arc<dyn DocumentRegistry>,
    pub(crate) chunker: Arc<dyn Chunker>,
    pub(crate) generator: Arc<dyn TextGenerator>,
}

impl std::fmt::Debug for RagEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagEngine")
            .field("config", &self.config)
            .field("embedder", &self.embedder.model_name())
            .field("chunker", &self.chunker.strategy())
            .field("generator", &self.generator.model_name())
            .finish_non_exhaustive()
    }
}

impl RagEngine {
    /// Create a new [`RagEngineBuilder`].
    pub fn builder() -> RagEngineBuilder {
        RagEngineBuilder::default()
    }

    /// Open an engine backed by the file stores under `config.storage_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if either store cannot be opened.
    pub fn open(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn TextGenerator>,
    ) -> Result<Self> {
        let registry = FileRegistry::open(config.registry_path())?;
        let index = PersistentVectorIndex::open(config.index_path())?;
        Self::builder()
            .embedding_provider(embedder)
            .generator(generator)
            .registry(Arc::new(registry))
            .vector_index(Arc::new(index))
            .config(config)
            .build()
    }

    /// The engine configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// The embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// The vector index.
    pub fn vector_index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// The document registry.
    pub fn registry(&self) -> &Arc<dyn DocumentRegistry> {
        &self.registry
    }

    /// The generation capability.
    pub fn generator(&self) -> &Arc<dyn TextGenerator> {
        &self.generator
    }

    /// Ingest a document: chunk, embed, index, register.
    ///
    /// A duplicate id or content that yields no chunks is reported as an
    /// [`AddOutcome`] and leaves all state untouched. If registration fails
    /// after the chunks were indexed, those chunks are removed again before
    /// the error is returned.
    ///
    /// # Errors
    ///
    /// Returns an error naming the document and stage when embedding,
    /// indexing or registration fails.
    pub fn add_document(&self, document: NewDocument) -> Result<AddOutcome> {
        let doc_id = document.resolved_id();
        validate_doc_id(&doc_id)?;

        if self.registry.contains(&doc_id)? {
            info!(doc.id = %doc_id, "document already registered");
            return Ok(AddOutcome::Duplicate { doc_id });
        }

        let pieces = self.chunker.chunk(&document.content);
        if pieces.is_empty() {
            warn!(doc.id = %doc_id, "document produced no chunks");
            return Ok(AddOutcome::EmptyDocument { doc_id });
        }

        let texts: Vec<&str> = pieces.iter().map(String::as_str).collect();
        debug!(doc.id = %doc_id, batch_size = texts.len(), model = self.embedder.model_name(), "embedding chunks");
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .and_then(|vectors| validate_batch(self.embedder.as_ref(), texts.len(), &vectors).map(|()| vectors))
            .map_err(|e| {
                error!(doc.id = %doc_id, error = %e, "embedding failed during ingestion");
                e.during(&doc_id, "embed")
            })?;

        let chunks: Vec<IndexedChunk> = pieces
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(sequence_index, (text, embedding))| {
                let mut metadata = document.metadata.clone();
                metadata.insert(keys::DOC_ID.into(), doc_id.clone().into());
                metadata.insert(keys::TITLE.into(), document.title.clone().into());
                metadata.insert(keys::CHUNK_INDEX.into(), sequence_index.into());
                metadata.insert(keys::LENGTH.into(), text.chars().count().into());
                IndexedChunk {
                    id: IndexedChunk::compose_id(&doc_id, sequence_index),
                    doc_id: doc_id.clone(),
                    sequence_index,
                    text,
                    embedding,
                    metadata,
                }
            })
            .collect();

        self.index.upsert(&chunks).map_err(|e| {
            error!(doc.id = %doc_id, error = %e, "upsert failed during ingestion");
            e.during(&doc_id, "index")
        })?;

        let record = DocumentRecord {
            doc_id: doc_id.clone(),
            title: document.title,
            metadata: document.metadata,
            added_at: Utc::now(),
            chunk_count: chunks.len(),
            char_count: document.content.chars().count(),
            word_count: word_count(&document.content),
        };

        if let Err(e) = self.registry.insert(record, &document.content) {
            error!(doc.id = %doc_id, error = %e, "registration failed, removing indexed chunks");
            let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
            if let Err(cleanup) = self.index.delete_ids(&ids) {
                error!(doc.id = %doc_id, error = %cleanup, "could not remove orphaned chunks");
            }
            return Err(e.during(&doc_id, "register"));
        }

        let chunk_count = chunks.len();
        info!(doc.id = %doc_id, chunk_count, "ingested document");
        Ok(AddOutcome::Added { doc_id, chunks_created: chunk_count })
    }

    /// Nearest chunks to `query`, optionally restricted to one document.
    ///
    /// Results are ordered by non-increasing similarity. `top_k == 0` yields
    /// no results.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be embedded or the index fails.
    pub fn search(&self, query: &str, top_k: usize, doc_filter: Option<&str>) -> Result<SearchResponse> {
        let total_searched = self.index.count()?;
        if top_k == 0 {
            return Ok(SearchResponse { query: query.to_string(), results: Vec::new(), total_searched });
        }

        let embedding = self.embed_query(query)?;
        let filter = doc_filter.map(MetadataFilter::doc_id);
        let matches = self.index.query(&embedding, top_k, filter.as_ref()).map_err(|e| {
            error!(error = %e, "vector index query failed");
            e
        })?;

        let mut titles: HashMap<String, String> = HashMap::new();
        let mut results = Vec::with_capacity(matches.len());
        for m in matches {
            results.push(self.to_hit(m, &mut titles)?);
        }

        info!(result_count = results.len(), total_searched, doc.filter = ?doc_filter, "search completed");
        Ok(SearchResponse { query: query.to_string(), results, total_searched })
    }

    /// Search every document and aggregate hits per document.
    ///
    /// Retrieves `top_k * GROUPING_OVERSAMPLE` chunks, groups them by document
    /// in first-seen order, sorts groups by their best similarity and keeps
    /// the first `top_k`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying search fails.
    pub fn search_all_grouped(&self, query: &str, top_k: usize) -> Result<Vec<DocumentGroup>> {
        let response = self.search(query, top_k.saturating_mul(GROUPING_OVERSAMPLE), None)?;

        let mut groups: Vec<DocumentGroup> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for hit in response.results {
            match positions.get(&hit.doc_id) {
                Some(&at) => {
                    let group = &mut groups[at];
                    group.max_similarity = group.max_similarity.max(hit.similarity);
                    group.chunk_count += 1;
                    group.top_chunks.push(hit);
                }
                None => {
                    positions.insert(hit.doc_id.clone(), groups.len());
                    groups.push(DocumentGroup {
                        doc_id: hit.doc_id.clone(),
                        title: hit.doc_title.clone(),
                        max_similarity: hit.similarity,
                        chunk_count: 1,
                        top_chunks: vec![hit],
                    });
                }
            }
        }

        groups.sort_by(|a, b| b.max_similarity.total_cmp(&a.max_similarity));
        groups.truncate(top_k);

        info!(group_count = groups.len(), "grouped search completed");
        Ok(groups)
    }

    /// Answer `question` from the chunks of one document.
    ///
    /// # Errors
    ///
    /// Returns an error only for storage, index or embedding failures.
    /// A missing document, an empty retrieval and a failed generation call
    /// are reported through [`AnswerOutcome`].
    pub fn answer_question(&self, doc_id: &str, question: &str) -> Result<AnswerOutcome> {
        let Some(record) = self.registry.get(doc_id)? else {
            info!(doc.id = %doc_id, "question for unknown document");
            return Ok(AnswerOutcome::DocumentNotFound { doc_id: doc_id.to_string() });
        };

        let sources = self.search(question, self.config.answer_top_k, Some(doc_id))?.results;
        if sources.is_empty() {
            warn!(doc.id = %doc_id, "no relevant content for question");
            return Ok(AnswerOutcome::NoRelevantContent { doc_id: doc_id.to_string() });
        }

        let context = sources.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join("\n\n");
        let prompt = answer_prompt(&record.title, &context, question);
        let params = GenerationParams::standard(&self.config);

        debug!(doc.id = %doc_id, model = self.generator.model_name(), source_count = sources.len(), "generating answer");
        match self.generator.generate(&prompt, &params) {
            Ok(answer) => {
                info!(doc.id = %doc_id, source_count = sources.len(), "answered question");
                Ok(AnswerOutcome::Answered {
                    doc_id: doc_id.to_string(),
                    doc_title: record.title,
                    answer,
                    sources,
                    context,
                })
            }
            Err(e) => {
                warn!(doc.id = %doc_id, error = %e, "answer generation failed");
                Ok(AnswerOutcome::GenerationFailed {
                    doc_id: doc_id.to_string(),
                    doc_title: record.title,
                    error: e.to_string(),
                    sources,
                    context,
                })
            }
        }
    }

    /// Registry record and raw content of one document.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Storage`] if the document is registered but its
    /// content cannot be read.
    pub fn get_document(&self, doc_id: &str) -> Result<Lookup<StoredDocument>> {
        let Some(record) = self.registry.get(doc_id)? else {
            return Ok(Lookup::NotFound { doc_id: doc_id.to_string() });
        };
        let content = self.registry.content(doc_id)?.ok_or_else(|| {
            error!(doc.id = %doc_id, "registered document has no content");
            RagError::storage("read_content", format!("document '{doc_id}' has no stored content"))
        })?;
        Ok(Lookup::Found(StoredDocument { record, content }))
    }

    /// The indexed chunks of one document, in sequence order.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry or index fails.
    pub fn document_chunks(&self, doc_id: &str) -> Result<Lookup<Vec<IndexedChunk>>> {
        if !self.registry.contains(doc_id)? {
            return Ok(Lookup::NotFound { doc_id: doc_id.to_string() });
        }
        let mut chunks = self.index.get_where(&MetadataFilter::doc_id(doc_id))?;
        chunks.sort_by_key(|c| c.sequence_index);
        Ok(Lookup::Found(chunks))
    }

    /// Every registered document, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be read.
    pub fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        Ok(self.registry.list()?.iter().map(DocumentSummary::from).collect())
    }

    /// Delete a document and every chunk derived from it.
    ///
    /// # Errors
    ///
    /// Returns an error if the index or registry fails. Chunks are removed
    /// before the registry entry, so a failure leaves the document listed
    /// and a retry completes the cascade.
    pub fn delete_document(&self, doc_id: &str) -> Result<Lookup<Deleted>> {
        let Some(record) = self.registry.get(doc_id)? else {
            return Ok(Lookup::NotFound { doc_id: doc_id.to_string() });
        };

        let chunks = self.index.get_where(&MetadataFilter::doc_id(doc_id))?;
        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        if !ids.is_empty() {
            self.index.delete_ids(&ids).map_err(|e| {
                error!(doc.id = %doc_id, error = %e, "chunk deletion failed");
                e.during(doc_id, "delete_chunks")
            })?;
        }

        self.registry.remove(doc_id).map_err(|e| {
            error!(doc.id = %doc_id, error = %e, "registry removal failed");
            e.during(doc_id, "unregister")
        })?;

        info!(doc.id = %doc_id, chunk_count = ids.len(), "deleted document");
        Ok(Lookup::Found(Deleted {
            doc_id: doc_id.to_string(),
            title: record.title,
            chunks_deleted: ids.len(),
        }))
    }

    /// Engine-wide counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry or index cannot be read.
    pub fn get_statistics(&self) -> Result<Statistics> {
        let records = self.registry.list()?;
        Ok(Statistics {
            total_documents: records.len(),
            total_chunks: self.index.count()?,
            total_words: records.iter().map(|r| r.word_count).sum(),
        })
    }

    fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let vectors = self.embedder.embed_batch(&[query]).map_err(|e| {
            error!(error = %e, "query embedding failed");
            e
        })?;
        validate_batch(self.embedder.as_ref(), 1, &vectors)?;
        vectors.into_iter().next().ok_or_else(|| RagError::Embedding {
            provider: self.embedder.model_name().to_string(),
            message: "provider returned no embedding for the query".to_string(),
        })
    }

    fn to_hit(&self, m: IndexMatch, titles: &mut HashMap<String, String>) -> Result<SearchHit> {
        let doc_id = match m.metadata.get(keys::DOC_ID).and_then(|v| v.as_str()) {
            Some(id) => id.to_string(),
            None => m.id.rsplit_once('_').map_or_else(|| m.id.clone(), |(id, _)| id.to_string()),
        };

        let doc_title = match titles.get(&doc_id) {
            Some(title) => title.clone(),
            None => {
                let title = match self.registry.get(&doc_id)? {
                    Some(record) => record.title,
                    None => m
                        .metadata
                        .get(keys::TITLE)
                        .and_then(|v| v.as_str())
                        .unwrap_or(UNKNOWN_TITLE)
                        .to_string(),
                };
                titles.insert(doc_id.clone(), title.clone());
                title
            }
        };

        Ok(SearchHit { chunk_id: m.id, doc_id, doc_title, text: m.text, similarity: m.similarity })
    }
}

/// Builder for constructing a [`RagEngine`].
///
/// Only the embedding provider is required. The remaining parts default to
/// in-memory stores, a [`ParagraphChunker`] sized from the configuration and
/// a [`DisabledGenerator`].
#[derive(Default)]
pub struct RagEngineBuilder {
    config: Option<RagConfig>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    index: Option<Arc<dyn VectorIndex>>,
    registry: Option<Arc<dyn DocumentRegistry>>,
    chunker: Option<Arc<dyn Chunker>>,
    generator: Option<Arc<dyn TextGenerator>>,
}

impl RagEngineBuilder {
    /// Set the engine configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(provider);
        self
    }

    /// Set the vector index backend.
    pub fn vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Set the document registry.
    pub fn registry(mut self, registry: Arc<dyn DocumentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the chunker used at ingestion.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the generation capability.
    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Build the [`RagEngine`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if no embedding provider was set.
    pub fn build(self) -> Result<RagEngine> {
        let config = self.config.unwrap_or_default();
        let embedder = self
            .embedder
            .ok_or_else(|| RagError::Config("embedding_provider is required".to_string()))?;
        let chunker = self.chunker.unwrap_or_else(|| {
            Arc::new(ParagraphChunker::new(config.chunk_size, config.chunk_overlap))
        });

        Ok(RagEngine {
            embedder,
            index: self.index.unwrap_or_else(|| Arc::new(InMemoryVectorIndex::new())),
            registry: self.registry.unwrap_or_else(|| Arc::new(InMemoryRegistry::new())),
            chunker,
            generator: self.generator.unwrap_or_else(|| Arc::new(DisabledGenerator)),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::hashing::HashingEmbeddingProvider;

    /// Records every prompt and replies with a fixed answer.
    struct EchoGenerator {
        prompts: Mutex<Vec<String>>,
    }

    impl TextGenerator for EchoGenerator {
        fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("Thirty days notice is required.".to_string())
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    /// Registry whose inserts always fail.
    struct FailingRegistry;

    impl DocumentRegistry for FailingRegistry {
        fn get(&self, _doc_id: &str) -> Result<Option<DocumentRecord>> {
            Ok(None)
        }
        fn content(&self, _doc_id: &str) -> Result<Option<String>> {
            Ok(None)
        }
        fn insert(&self, _record: DocumentRecord, _content: &str) -> Result<()> {
            Err(RagError::storage("insert", "disk full"))
        }
        fn remove(&self, _doc_id: &str) -> Result<Option<DocumentRecord>> {
            Ok(None)
        }
        fn list(&self) -> Result<Vec<DocumentRecord>> {
            Ok(Vec::new())
        }
    }

    fn engine() -> RagEngine {
        RagEngine::builder().embedding_provider(Arc::new(HashingEmbeddingProvider::new(128))).build().unwrap()
    }

    #[test]
    fn builder_requires_embedder() {
        assert!(matches!(RagEngine::builder().build(), Err(RagError::Config(_))));
    }

    #[test]
    fn chunk_metadata_carries_reserved_keys_over_caller_keys() {
        let engine = engine();
        engine
            .add_document(
                NewDocument::new("Clause one.\n\nClause two.", "Lease")
                    .with_id("d1")
                    .with_metadata("title", "caller title")
                    .with_metadata("jurisdiction", "IN"),
            )
            .unwrap();

        let chunks = engine.document_chunks("d1").unwrap().found().unwrap();
        assert_eq!(chunks[0].metadata[keys::TITLE], "Lease");
        assert_eq!(chunks[0].metadata[keys::DOC_ID], "d1");
        assert_eq!(chunks[0].metadata[keys::CHUNK_INDEX], 0);
        assert_eq!(chunks[0].metadata["jurisdiction"], "IN");

        let record = engine.registry().get("d1").unwrap().unwrap();
        assert_eq!(record.metadata["title"], "caller title");
    }

    #[test]
    fn failed_registration_removes_indexed_chunks() {
        let engine = RagEngine::builder()
            .embedding_provider(Arc::new(HashingEmbeddingProvider::new(32)))
            .registry(Arc::new(FailingRegistry))
            .build()
            .unwrap();

        let err = engine.add_document(NewDocument::new("Some text.", "T").with_id("d1")).unwrap_err();
        assert!(matches!(&err, RagError::Storage { message, .. } if message.contains("'d1' (register)")));
        assert_eq!(engine.vector_index().count().unwrap(), 0);
    }

    #[test]
    fn whitespace_only_document_is_rejected() {
        let engine = engine();
        let outcome = engine.add_document(NewDocument::new(" \n\n \t", "Blank")).unwrap();
        assert!(matches!(outcome, AddOutcome::EmptyDocument { .. }));
        assert_eq!(engine.get_statistics().unwrap().total_documents, 0);
    }

    #[test]
    fn answer_prompt_embeds_title_context_and_question() {
        let generator = Arc::new(EchoGenerator { prompts: Mutex::new(Vec::new()) });
        let engine = RagEngine::builder()
            .embedding_provider(Arc::new(HashingEmbeddingProvider::new(128)))
            .generator(generator.clone())
            .build()
            .unwrap();
        engine
            .add_document(
                NewDocument::new("Termination requires thirty days notice.", "Lease").with_id("d1"),
            )
            .unwrap();

        let outcome = engine.answer_question("d1", "What notice is required?").unwrap();
        assert!(matches!(&outcome, AnswerOutcome::Answered { answer, .. } if answer.contains("Thirty")));

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("Document: Lease"));
        assert!(prompts[0].contains("Termination requires thirty days notice."));
        assert!(prompts[0].contains("Question: What notice is required?"));
    }

    #[test]
    fn zero_top_k_searches_nothing() {
        let engine = engine();
        engine.add_document(NewDocument::new("text", "T")).unwrap();
        let response = engine.search("text", 0, None).unwrap();
        assert!(response.results.is_empty());
        assert_eq!(response.total_searched, 1);
    }
}
