//! Retrieval engine for legal documents.
//!
//! This crate provides:
//! - Paragraph-aware and fixed-window chunking
//! - Embedding providers behind a blocking trait, with an explicit model lifecycle
//! - In-memory and file-backed vector indexes with metadata filters
//! - A document registry and the [`RagEngine`] that ties them together
//! - Document comparison and whole-document analysis over a [`TextGenerator`]
//! - A JSON [`DocumentTool`] and an async [`RagService`] for hosts
//!
//! ## Features
//!
//! - `gemini` enables [`gemini::GeminiGenerator`]
//! - `openai` enables [`openai::OpenAIEmbeddingProvider`]

pub mod analysis;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generation;
pub mod hashing;
pub mod inmemory;
pub mod outcome;
pub mod persistent;
pub mod registry;
pub mod service;
pub mod tool;
pub mod vectorindex;

#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "openai")]
pub mod openai;

pub use analysis::{
    AnalysisMode, AnalysisOutcome, AnalysisReport, KeyElements, LexicalScore, RiskOutcome,
};
pub use chunking::{Chunker, ChunkingStrategy, FixedWindowChunker, ParagraphChunker};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{
    DocumentGroup, DocumentRecord, DocumentStats, DocumentSummary, IndexMatch, IndexedChunk,
    Metadata, NewDocument, SearchHit, SearchResponse, Statistics, StoredDocument, content_id,
};
pub use embedding::{EmbeddingProvider, ManagedEmbedder};
pub use engine::{GROUPING_OVERSAMPLE, RagEngine, RagEngineBuilder};
pub use error::{RagError, Result};
pub use generation::{DisabledGenerator, GenerationParams, TextGenerator};
pub use hashing::HashingEmbeddingProvider;
pub use inmemory::InMemoryVectorIndex;
pub use outcome::{
    AddOutcome, AnswerOutcome, CompareOutcome, ComparePosition, ComparedDocument, Deleted, Lookup,
};
pub use persistent::PersistentVectorIndex;
pub use registry::{DocumentRegistry, FileRegistry, InMemoryRegistry};
pub use service::RagService;
pub use tool::DocumentTool;
pub use vectorindex::{MetadataFilter, VectorIndex, cosine_similarity};
