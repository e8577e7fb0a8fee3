//! JSON tool surface over the engine.
//!
//! [`DocumentTool`] exposes the engine operations as named calls taking and
//! returning JSON, for hosts such as agent frameworks or HTTP handlers that
//! dispatch on an operation name.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use luminary_rag::{DocumentTool, HashingEmbeddingProvider, RagEngine};
//! use serde_json::json;
//!
//! let engine = RagEngine::builder()
//!     .embedding_provider(Arc::new(HashingEmbeddingProvider::new(64)))
//!     .build()?;
//! let tool = DocumentTool::new(Arc::new(engine));
//!
//! let reply = tool.execute("add_document", json!({
//!     "content": "The tenant shall pay rent monthly.",
//!     "title": "Lease",
//!     "doc_id": "lease-1"
//! }))?;
//! assert_eq!(reply["success"], true);
//! # Ok::<(), luminary_rag::RagError>(())
//! ```

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{error, info};

use crate::document::{Metadata, NewDocument};
use crate::engine::RagEngine;
use crate::error::{RagError, Result};
use crate::outcome::{AddOutcome, AnswerOutcome, CompareOutcome, Lookup};

/// Names of the operations [`DocumentTool::execute`] accepts.
pub const OPERATIONS: &[&str] = &[
    "add_document",
    "search_documents",
    "semantic_search",
    "query_document",
    "get_document",
    "list_documents",
    "delete_document",
    "compare_documents",
    "get_statistics",
];

/// A dispatcher from operation names and JSON arguments to the engine.
///
/// Every reply carries a boolean `success` field. Expected conditions such
/// as a missing document produce `success: false` with a `message`; storage
/// and embedding failures are returned as errors.
#[derive(Debug, Clone)]
pub struct DocumentTool {
    engine: Arc<RagEngine>,
}

impl DocumentTool {
    /// Create a tool backed by `engine`.
    pub fn new(engine: Arc<RagEngine>) -> Self {
        Self { engine }
    }

    /// Tool name.
    pub fn name(&self) -> &str {
        "legal_documents"
    }

    /// Tool description.
    pub fn description(&self) -> &str {
        "Store, search, query and compare legal documents"
    }

    /// JSON schema of the arguments accepted by `operation`.
    pub fn parameters_schema(&self, operation: &str) -> Option<Value> {
        let schema = match operation {
            "add_document" => json!({
                "type": "object",
                "properties": {
                    "content": { "type": "string", "description": "Full text of the document" },
                    "title": { "type": "string", "description": "Human-readable title" },
                    "metadata": { "type": "object", "description": "Arbitrary metadata stored with the document" },
                    "doc_id": { "type": "string", "description": "Explicit id. Derived from the content if omitted." }
                },
                "required": ["content", "title"]
            }),
            "search_documents" => json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "The search query" },
                    "top_k": { "type": "integer", "description": "Maximum number of chunks to return" },
                    "doc_id": { "type": "string", "description": "Restrict the search to one document" }
                },
                "required": ["query"]
            }),
            "semantic_search" => json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "The search query" },
                    "top_k": { "type": "integer", "description": "Maximum number of documents to return" }
                },
                "required": ["query"]
            }),
            "query_document" => json!({
                "type": "object",
                "properties": {
                    "doc_id": { "type": "string", "description": "Document to ask about" },
                    "question": { "type": "string", "description": "The question" }
                },
                "required": ["doc_id", "question"]
            }),
            "get_document" | "delete_document" => json!({
                "type": "object",
                "properties": {
                    "doc_id": { "type": "string", "description": "Document id" }
                },
                "required": ["doc_id"]
            }),
            "compare_documents" => json!({
                "type": "object",
                "properties": {
                    "doc_id1": { "type": "string", "description": "First document id" },
                    "doc_id2": { "type": "string", "description": "Second document id" }
                },
                "required": ["doc_id1", "doc_id2"]
            }),
            "list_documents" | "get_statistics" => json!({ "type": "object", "properties": {} }),
            _ => return None,
        };
        Some(schema)
    }

    /// Run `operation` with `args`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] for an unknown operation or
    /// malformed arguments, and propagates engine failures.
    pub fn execute(&self, operation: &str, args: Value) -> Result<Value> {
        info!(operation, "document tool called");
        let reply = match operation {
            "add_document" => self.add_document(&args),
            "search_documents" => self.search_documents(&args),
            "semantic_search" => self.semantic_search(&args),
            "query_document" => self.query_document(&args),
            "get_document" => self.get_document(&args),
            "list_documents" => self.list_documents(),
            "delete_document" => self.delete_document(&args),
            "compare_documents" => self.compare_documents(&args),
            "get_statistics" => self.get_statistics(),
            other => Err(RagError::InvalidArgument(format!("unknown operation '{other}'"))),
        };
        reply.inspect_err(|e| error!(operation, error = %e, "document tool failed"))
    }

    fn add_document(&self, args: &Value) -> Result<Value> {
        let metadata: Metadata = match args.get("metadata") {
            None | Some(Value::Null) => Metadata::new(),
            Some(Value::Object(map)) => map.clone().into_iter().collect(),
            Some(_) => return Err(RagError::InvalidArgument("'metadata' must be an object".into())),
        };
        let document = NewDocument {
            content: required_str(args, "content")?.to_string(),
            title: required_str(args, "title")?.to_string(),
            metadata,
            doc_id: optional_str(args, "doc_id")?.map(str::to_string),
        };

        Ok(match self.engine.add_document(document)? {
            AddOutcome::Added { doc_id, chunks_created } => json!({
                "success": true,
                "doc_id": doc_id,
                "chunks_created": chunks_created,
                "message": format!("Document added with {chunks_created} chunks"),
            }),
            AddOutcome::Duplicate { doc_id } => json!({
                "success": false,
                "doc_id": doc_id,
                "message": format!("Document {doc_id} already exists"),
            }),
            AddOutcome::EmptyDocument { doc_id } => json!({
                "success": false,
                "doc_id": doc_id,
                "message": "Document has no content to index",
            }),
        })
    }

    fn search_documents(&self, args: &Value) -> Result<Value> {
        let query = required_str(args, "query")?;
        let top_k = optional_usize(args, "top_k")?.unwrap_or(self.engine.config().search_top_k);
        let doc_id = optional_str(args, "doc_id")?;

        let response = self.engine.search(query, top_k, doc_id)?;
        Ok(json!({
            "success": true,
            "query": response.query,
            "results_count": response.results.len(),
            "total_searched": response.total_searched,
            "results": response.results,
        }))
    }

    fn semantic_search(&self, args: &Value) -> Result<Value> {
        let query = required_str(args, "query")?;
        let top_k = optional_usize(args, "top_k")?.unwrap_or(self.engine.config().grouped_top_k);

        let groups = self.engine.search_all_grouped(query, top_k)?;
        Ok(json!({
            "success": true,
            "query": query,
            "total_docs_found": groups.len(),
            "documents": groups,
        }))
    }

    fn query_document(&self, args: &Value) -> Result<Value> {
        let doc_id = required_str(args, "doc_id")?;
        let question = required_str(args, "question")?;

        let outcome = self.engine.answer_question(doc_id, question)?;
        let text = outcome.display_text();
        Ok(match outcome {
            AnswerOutcome::Answered { doc_id, doc_title, sources, .. } => json!({
                "success": true,
                "retrieved": true,
                "generated": true,
                "doc_id": doc_id,
                "doc_title": doc_title,
                "question": question,
                "answer": text,
                "sources": sources,
            }),
            AnswerOutcome::GenerationFailed { doc_id, doc_title, error, sources, context } => json!({
                "success": false,
                "retrieved": true,
                "generated": false,
                "doc_id": doc_id,
                "doc_title": doc_title,
                "question": question,
                "answer": text,
                "error": error,
                "sources": sources,
                "context": context,
            }),
            AnswerOutcome::NoRelevantContent { doc_id } => json!({
                "success": false,
                "doc_id": doc_id,
                "message": "No relevant content found in document",
            }),
            AnswerOutcome::DocumentNotFound { doc_id } => not_found(&doc_id),
        })
    }

    fn get_document(&self, args: &Value) -> Result<Value> {
        let doc_id = required_str(args, "doc_id")?;
        Ok(match self.engine.get_document(doc_id)? {
            Lookup::Found(doc) => json!({
                "success": true,
                "doc_id": doc.record.doc_id,
                "title": doc.record.title,
                "content": doc.content,
                "metadata": doc.record.metadata,
                "added_at": doc.record.added_at,
                "stats": doc.record.stats(),
            }),
            Lookup::NotFound { doc_id } => not_found(&doc_id),
        })
    }

    fn list_documents(&self) -> Result<Value> {
        let documents = self.engine.list_documents()?;
        Ok(json!({ "success": true, "count": documents.len(), "documents": documents }))
    }

    fn delete_document(&self, args: &Value) -> Result<Value> {
        let doc_id = required_str(args, "doc_id")?;
        Ok(match self.engine.delete_document(doc_id)? {
            Lookup::Found(deleted) => json!({
                "success": true,
                "doc_id": deleted.doc_id,
                "title": deleted.title,
                "chunks_deleted": deleted.chunks_deleted,
                "message": format!("Document '{}' deleted successfully", deleted.title),
            }),
            Lookup::NotFound { doc_id } => not_found(&doc_id),
        })
    }

    fn compare_documents(&self, args: &Value) -> Result<Value> {
        let first = required_str(args, "doc_id1")?;
        let second = required_str(args, "doc_id2")?;

        Ok(match self.engine.compare(first, second)? {
            CompareOutcome::Compared { first, second, comparison } => json!({
                "success": true,
                "doc1": { "id": first.doc_id, "title": first.title },
                "doc2": { "id": second.doc_id, "title": second.title },
                "comparison": comparison,
            }),
            CompareOutcome::GenerationFailed { first, second, error, fallback } => json!({
                "success": true,
                "generated": false,
                "doc1": { "id": first.doc_id, "title": first.title },
                "doc2": { "id": second.doc_id, "title": second.title },
                "error": error,
                "comparison": fallback,
            }),
            CompareOutcome::DocumentNotFound { doc_id, position } => json!({
                "success": false,
                "doc_id": doc_id,
                "message": format!("Document {} not found: {doc_id}", position.ordinal()),
            }),
        })
    }

    fn get_statistics(&self) -> Result<Value> {
        let stats = self.engine.get_statistics()?;
        Ok(json!({
            "success": true,
            "total_documents": stats.total_documents,
            "total_chunks": stats.total_chunks,
            "total_words": stats.total_words,
            "storage_path": self.engine.config().storage_path,
        }))
    }
}

fn not_found(doc_id: &str) -> Value {
    json!({ "success": false, "doc_id": doc_id, "message": format!("Document {doc_id} not found") })
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| RagError::InvalidArgument(format!("missing required '{key}' parameter")))
}

fn optional_str<'a>(args: &'a Value, key: &str) -> Result<Option<&'a str>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(RagError::InvalidArgument(format!("'{key}' must be a string"))),
    }
}

fn optional_usize(args: &Value, key: &str) -> Result<Option<usize>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| RagError::InvalidArgument(format!("'{key}' must be a non-negative integer"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::HashingEmbeddingProvider;

    fn tool() -> DocumentTool {
        let engine = RagEngine::builder()
            .embedding_provider(Arc::new(HashingEmbeddingProvider::new(64)))
            .build()
            .unwrap();
        DocumentTool::new(Arc::new(engine))
    }

    #[test]
    fn every_operation_has_a_schema() {
        let tool = tool();
        for op in OPERATIONS {
            assert!(tool.parameters_schema(op).is_some(), "{op} has no schema");
        }
        assert!(tool.parameters_schema("drop_tables").is_none());
    }

    #[test]
    fn missing_arguments_are_invalid() {
        let tool = tool();
        let err = tool.execute("search_documents", json!({})).unwrap_err();
        assert!(matches!(err, RagError::InvalidArgument(msg) if msg.contains("'query'")));
        let err = tool.execute("search_documents", json!({"query": "x", "top_k": -1})).unwrap_err();
        assert!(matches!(err, RagError::InvalidArgument(_)));
        assert!(tool.execute("drop_tables", json!({})).is_err());
    }

    #[test]
    fn add_search_delete_round() {
        let tool = tool();
        let added = tool
            .execute(
                "add_document",
                json!({"content": "Rent is due monthly.", "title": "Lease", "doc_id": "d1",
                       "metadata": {"court": "none"}}),
            )
            .unwrap();
        assert_eq!(added["chunks_created"], 1);

        let again = tool
            .execute("add_document", json!({"content": "Other.", "title": "Lease", "doc_id": "d1"}))
            .unwrap();
        assert_eq!(again["success"], false);

        let found = tool.execute("search_documents", json!({"query": "rent monthly"})).unwrap();
        assert_eq!(found["results"][0]["doc_title"], "Lease");

        let deleted = tool.execute("delete_document", json!({"doc_id": "d1"})).unwrap();
        assert_eq!(deleted["chunks_deleted"], 1);
        let gone = tool.execute("get_document", json!({"doc_id": "d1"})).unwrap();
        assert_eq!(gone["success"], false);
    }

    #[test]
    fn compare_reports_the_missing_position() {
        let tool = tool();
        tool.execute("add_document", json!({"content": "A.", "title": "A", "doc_id": "d1"})).unwrap();
        let reply =
            tool.execute("compare_documents", json!({"doc_id1": "d1", "doc_id2": "d2"})).unwrap();
        assert_eq!(reply["success"], false);
        assert_eq!(reply["message"], "Document 2 not found: d2");
    }

    #[test]
    fn semantic_search_groups_under_documents() {
        let tool = tool();
        tool.execute("add_document", json!({"content": "Rent is due monthly.", "title": "Lease", "doc_id": "d1"}))
            .unwrap();
        tool.execute("add_document", json!({"content": "Rent rises yearly.", "title": "Addendum", "doc_id": "d2"}))
            .unwrap();

        let reply = tool.execute("semantic_search", json!({"query": "rent"})).unwrap();
        assert_eq!(reply["success"], true);
        assert_eq!(reply["total_docs_found"], 2);
        let documents = reply["documents"].as_array().unwrap();
        assert_eq!(documents.len(), 2);
        assert!(documents.iter().all(|d| d["top_chunks"].is_array()));
        assert!(reply.get("results").is_none());
    }

    #[test]
    fn failed_generation_reports_context_and_no_success() {
        let tool = tool();
        tool.execute("add_document", json!({"content": "Notice is thirty days.", "title": "Lease", "doc_id": "d1"}))
            .unwrap();

        let reply =
            tool.execute("query_document", json!({"doc_id": "d1", "question": "How much notice?"})).unwrap();
        assert_eq!(reply["success"], false);
        assert_eq!(reply["retrieved"], true);
        assert_eq!(reply["generated"], false);
        assert_eq!(reply["context"], "Notice is thirty days.");
        assert_eq!(reply["sources"].as_array().unwrap().len(), 1);
        assert!(reply["error"].as_str().unwrap().contains("disabled"));
    }
}
