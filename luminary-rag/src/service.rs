//! Async facade over the blocking engine.
//!
//! Every call is moved onto Tokio's blocking thread pool with
//! [`tokio::task::spawn_blocking`], so async hosts never stall a runtime
//! worker on embedding, file I/O or model calls.

use std::sync::Arc;

use crate::analysis::{AnalysisMode, AnalysisOutcome, RiskOutcome};
use crate::document::{
    DocumentGroup, DocumentSummary, IndexedChunk, NewDocument, SearchResponse, Statistics, StoredDocument,
};
use crate::engine::RagEngine;
use crate::error::{RagError, Result};
use crate::outcome::{AddOutcome, AnswerOutcome, CompareOutcome, Deleted, Lookup};

/// A cloneable async handle to a shared [`RagEngine`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use luminary_rag::{HashingEmbeddingProvider, NewDocument, RagEngine, RagService};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> luminary_rag::Result<()> {
/// let engine = RagEngine::builder()
///     .embedding_provider(Arc::new(HashingEmbeddingProvider::new(64)))
///     .build()?;
/// let service = RagService::new(Arc::new(engine));
///
/// service.add_document(NewDocument::new("Rent is due monthly.", "Lease")).await?;
/// assert_eq!(service.get_statistics().await?.total_documents, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RagService {
    engine: Arc<RagEngine>,
}

impl RagService {
    /// Wrap a shared engine.
    pub fn new(engine: Arc<RagEngine>) -> Self {
        Self { engine }
    }

    /// The wrapped engine.
    pub fn engine(&self) -> &Arc<RagEngine> {
        &self.engine
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&RagEngine) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || op(&engine))
            .await
            .map_err(|e| RagError::Task(e.to_string()))?
    }

    /// See [`RagEngine::add_document`].
    pub async fn add_document(&self, document: NewDocument) -> Result<AddOutcome> {
        self.run(move |engine| engine.add_document(document)).await
    }

    /// See [`RagEngine::search`].
    pub async fn search(
        &self,
        query: impl Into<String>,
        top_k: usize,
        doc_filter: Option<String>,
    ) -> Result<SearchResponse> {
        let query = query.into();
        self.run(move |engine| engine.search(&query, top_k, doc_filter.as_deref())).await
    }

    /// See [`RagEngine::search_all_grouped`].
    pub async fn search_all_grouped(
        &self,
        query: impl Into<String>,
        top_k: usize,
    ) -> Result<Vec<DocumentGroup>> {
        let query = query.into();
        self.run(move |engine| engine.search_all_grouped(&query, top_k)).await
    }

    /// See [`RagEngine::answer_question`].
    pub async fn answer_question(
        &self,
        doc_id: impl Into<String>,
        question: impl Into<String>,
    ) -> Result<AnswerOutcome> {
        let (doc_id, question) = (doc_id.into(), question.into());
        self.run(move |engine| engine.answer_question(&doc_id, &question)).await
    }

    /// See [`RagEngine::get_document`].
    pub async fn get_document(&self, doc_id: impl Into<String>) -> Result<Lookup<StoredDocument>> {
        let doc_id = doc_id.into();
        self.run(move |engine| engine.get_document(&doc_id)).await
    }

    /// See [`RagEngine::document_chunks`].
    pub async fn document_chunks(&self, doc_id: impl Into<String>) -> Result<Lookup<Vec<IndexedChunk>>> {
        let doc_id = doc_id.into();
        self.run(move |engine| engine.document_chunks(&doc_id)).await
    }

    /// See [`RagEngine::list_documents`].
    pub async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        self.run(RagEngine::list_documents).await
    }

    /// See [`RagEngine::delete_document`].
    pub async fn delete_document(&self, doc_id: impl Into<String>) -> Result<Lookup<Deleted>> {
        let doc_id = doc_id.into();
        self.run(move |engine| engine.delete_document(&doc_id)).await
    }

    /// See [`RagEngine::compare`].
    pub async fn compare(
        &self,
        doc_id1: impl Into<String>,
        doc_id2: impl Into<String>,
    ) -> Result<CompareOutcome> {
        let (first, second) = (doc_id1.into(), doc_id2.into());
        self.run(move |engine| engine.compare(&first, &second)).await
    }

    /// See [`RagEngine::get_statistics`].
    pub async fn get_statistics(&self) -> Result<Statistics> {
        self.run(RagEngine::get_statistics).await
    }

    /// See [`RagEngine::analyze_full_document`].
    pub async fn analyze_full_document(
        &self,
        text: impl Into<String>,
        mode: AnalysisMode,
    ) -> Result<AnalysisOutcome> {
        let text = text.into();
        self.run(move |engine| Ok(engine.analyze_full_document(&text, &mode))).await
    }

    /// See [`RagEngine::identify_risks`].
    pub async fn identify_risks(&self, text: impl Into<String>) -> Result<RiskOutcome> {
        let text = text.into();
        self.run(move |engine| Ok(engine.identify_risks(&text))).await
    }
}
