//! Tagged results for expected conditions.
//!
//! A duplicate id, a missing document or a failed generation call are not
//! errors: callers branch on them. Each variant carries the id it concerns.

use serde::{Deserialize, Serialize};

use crate::document::SearchHit;

/// Maximum number of context characters quoted when generation fails.
pub const FALLBACK_EXCERPT_CHARS: usize = 500;

/// Result of `add_document`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AddOutcome {
    /// The document was chunked, embedded and registered.
    Added {
        /// Id the document is stored under.
        doc_id: String,
        /// Number of chunks written to the vector index.
        chunks_created: usize,
    },
    /// A document with this id already exists. Nothing was written.
    Duplicate {
        /// The conflicting id.
        doc_id: String,
    },
    /// The content produced no chunks. Nothing was written.
    EmptyDocument {
        /// The id the document would have had.
        doc_id: String,
    },
}

impl AddOutcome {
    /// The document id this outcome concerns.
    pub fn doc_id(&self) -> &str {
        match self {
            Self::Added { doc_id, .. } | Self::Duplicate { doc_id } | Self::EmptyDocument { doc_id } => {
                doc_id
            }
        }
    }

    /// Whether the document was stored.
    pub fn is_added(&self) -> bool {
        matches!(self, Self::Added { .. })
    }
}

/// Result of a lookup by document id.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    /// The document exists.
    Found(T),
    /// No document is registered under `doc_id`.
    NotFound {
        /// The id that was looked up.
        doc_id: String,
    },
}

impl<T> Lookup<T> {
    /// The found value, if any.
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::NotFound { .. } => None,
        }
    }

    /// Whether the document was found.
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Transform the found value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Self::Found(value) => Lookup::Found(f(value)),
            Self::NotFound { doc_id } => Lookup::NotFound { doc_id },
        }
    }
}

/// Report of a cascading delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deleted {
    /// The removed document.
    pub doc_id: String,
    /// Its title.
    pub title: String,
    /// Chunks removed from the vector index.
    pub chunks_deleted: usize,
}

/// Result of document-scoped question answering.
///
/// Retrieval and generation are reported separately: when the model call
/// fails the retrieved sources are still returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// The model produced an answer.
    Answered {
        /// Document that was queried.
        doc_id: String,
        /// Its title.
        doc_title: String,
        /// The generated answer.
        answer: String,
        /// Chunks used as context.
        sources: Vec<SearchHit>,
        /// Context passed to the model.
        context: String,
    },
    /// Retrieval succeeded but the model call failed.
    GenerationFailed {
        /// Document that was queried.
        doc_id: String,
        /// Its title.
        doc_title: String,
        /// The generation error.
        error: String,
        /// Chunks that would have been used as context.
        sources: Vec<SearchHit>,
        /// Context that would have been passed to the model.
        context: String,
    },
    /// The document exists but no chunk matched the question.
    NoRelevantContent {
        /// Document that was queried.
        doc_id: String,
    },
    /// No document is registered under `doc_id`.
    DocumentNotFound {
        /// The id that was looked up.
        doc_id: String,
    },
}

impl AnswerOutcome {
    /// Retrieved sources, empty when retrieval did not run or found nothing.
    pub fn sources(&self) -> &[SearchHit] {
        match self {
            Self::Answered { sources, .. } | Self::GenerationFailed { sources, .. } => sources,
            Self::NoRelevantContent { .. } | Self::DocumentNotFound { .. } => &[],
        }
    }

    /// The text to show a reader: the answer, or the error followed by the
    /// opening of the retrieved context.
    pub fn display_text(&self) -> Option<String> {
        match self {
            Self::Answered { answer, .. } => Some(answer.clone()),
            Self::GenerationFailed { error, context, .. } => {
                let excerpt: String = context.chars().take(FALLBACK_EXCERPT_CHARS).collect();
                Some(format!("Error generating answer: {error}\n\nRelevant context found:\n{excerpt}..."))
            }
            Self::NoRelevantContent { .. } | Self::DocumentNotFound { .. } => None,
        }
    }
}

/// Which argument of `compare` a missing document was passed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparePosition {
    /// The first document argument.
    First,
    /// The second document argument.
    Second,
}

impl ComparePosition {
    /// 1-based position, as shown to users.
    pub fn ordinal(self) -> usize {
        match self {
            Self::First => 1,
            Self::Second => 2,
        }
    }
}

/// Id and title of one side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparedDocument {
    /// Document id.
    pub doc_id: String,
    /// Document title.
    pub title: String,
}

/// Result of comparing two documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompareOutcome {
    /// The model produced a comparison.
    Compared {
        /// First document.
        first: ComparedDocument,
        /// Second document.
        second: ComparedDocument,
        /// The generated comparison.
        comparison: String,
    },
    /// One of the documents is not registered. The first missing argument
    /// is reported.
    DocumentNotFound {
        /// The missing id.
        doc_id: String,
        /// Which argument it was.
        position: ComparePosition,
    },
    /// Both documents exist but the model call failed.
    GenerationFailed {
        /// First document.
        first: ComparedDocument,
        /// Second document.
        second: ComparedDocument,
        /// The generation error.
        error: String,
        /// A size-only comparison built from registry statistics.
        fallback: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_outcome_serializes_with_status_tag() {
        let added = AddOutcome::Added { doc_id: "d1".into(), chunks_created: 2 };
        let json = serde_json::to_value(&added).unwrap();
        assert_eq!(json["status"], "added");
        assert_eq!(json["chunks_created"], 2);
        assert_eq!(AddOutcome::Duplicate { doc_id: "d1".into() }.doc_id(), "d1");
        assert!(!AddOutcome::EmptyDocument { doc_id: "x".into() }.is_added());
    }

    #[test]
    fn lookup_map_keeps_not_found_id() {
        let missing: Lookup<u32> = Lookup::NotFound { doc_id: "nope".into() };
        assert_eq!(missing.map(|n| n + 1), Lookup::NotFound { doc_id: "nope".into() });
        assert_eq!(Lookup::Found(1).map(|n| n + 1).found(), Some(2));
    }

    #[test]
    fn failed_answer_quotes_bounded_context() {
        let outcome = AnswerOutcome::GenerationFailed {
            doc_id: "d1".into(),
            doc_title: "Lease".into(),
            error: "quota exceeded".into(),
            sources: Vec::new(),
            context: "x".repeat(2 * FALLBACK_EXCERPT_CHARS),
        };
        let text = outcome.display_text().unwrap();
        assert!(text.starts_with("Error generating answer: quota exceeded"));
        assert_eq!(text.matches('x').count(), FALLBACK_EXCERPT_CHARS);
        assert!(AnswerOutcome::NoRelevantContent { doc_id: "d1".into() }.display_text().is_none());
    }
}
