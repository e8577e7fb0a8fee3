//! Error types for the `luminary-rag` crate.
//!
//! Only failures that the caller cannot route around live here. Expected
//! conditions such as a duplicate document id or a missing document are
//! returned as ordinary values (see [`crate::outcome`]).

use thiserror::Error;

/// Errors that can occur in retrieval operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// The embedding backend failed. The whole batch is rejected.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector index backend.
    #[error("Vector index error ({backend}): {message}")]
    VectorIndex {
        /// The index backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The document registry or raw-body storage failed.
    #[error("Storage error during {operation}: {message}")]
    Storage {
        /// The storage operation that failed (e.g. `insert`, `load_index`).
        operation: String,
        /// A description of the failure.
        message: String,
    },

    /// The external text-generation capability failed.
    ///
    /// Retrieval flows never propagate this variant; they fold it into a
    /// structured outcome so the caller still receives the retrieved sources.
    #[error("Generation error ({provider}): {message}")]
    Generation {
        /// The generation provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A caller supplied an argument the operation cannot accept.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A blocking task offloaded by the async service did not complete.
    #[error("Background task failed: {0}")]
    Task(String),

    /// An I/O error from the file-backed stores.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A (de)serialization error from the file-backed stores.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RagError {
    pub(crate) fn storage(operation: &str, message: impl std::fmt::Display) -> Self {
        Self::Storage { operation: operation.to_string(), message: message.to_string() }
    }

    pub(crate) fn index(backend: &str, message: impl std::fmt::Display) -> Self {
        Self::VectorIndex { backend: backend.to_string(), message: message.to_string() }
    }

    /// Prefix the message with the document and pipeline stage that failed.
    pub(crate) fn during(self, doc_id: &str, stage: &str) -> Self {
        let context = |message: String| format!("document '{doc_id}' ({stage}): {message}");
        match self {
            Self::Embedding { provider, message } => {
                Self::Embedding { provider, message: context(message) }
            }
            Self::VectorIndex { backend, message } => {
                Self::VectorIndex { backend, message: context(message) }
            }
            Self::Storage { operation, message } => {
                Self::Storage { operation, message: context(message) }
            }
            Self::Generation { provider, message } => {
                Self::Generation { provider, message: context(message) }
            }
            other => other,
        }
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
