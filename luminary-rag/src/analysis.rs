//! Pairwise comparison and whole-document analysis.
//!
//! These flows work on raw document text rather than on the vector index.
//! Every flow makes at most two generation calls, and every generation
//! failure is folded into the returned outcome.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::chunking::line_grouped;
use crate::engine::RagEngine;
use crate::error::{RagError, Result};
use crate::generation::GenerationParams;
use crate::outcome::{CompareOutcome, ComparePosition, ComparedDocument, Lookup};

/// Characters of the document shown to the key-element extractor.
pub const KEY_ELEMENTS_PREFIX_CHARS: usize = 2000;
/// Characters of the document included in a comprehensive analysis.
pub const COMPREHENSIVE_PREFIX_CHARS: usize = 4000;
/// Characters of the document included in a summary.
pub const SUMMARY_PREFIX_CHARS: usize = 3000;
/// Characters of the document included in a specific-elements analysis.
pub const SPECIFIC_PREFIX_CHARS: usize = 3000;
/// Chunk size used to count the sections of a comprehensive analysis.
pub const ANALYSIS_CHUNK_SIZE: usize = 2000;
/// Chunk size used by lexical question answering.
pub const QA_CHUNK_SIZE: usize = 1500;
/// Number of chunks passed to the model in lexical question answering.
pub const QA_TOP_CHUNKS: usize = 3;
/// Appended to a document prefix when the document was cut.
pub const TRUNCATION_MARKER: &str = "...(truncated)";

const QA_SEPARATOR: &str = "\n\n---\n\n";

/// The longest prefix of `text` with at most `max_chars` characters.
pub fn char_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// What kind of analysis to run over a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Sectioned legal analysis of the document opening.
    Comprehensive,
    /// Short executive summary.
    Summary,
    /// Lists of statutes, clauses and other specific elements.
    Specific,
    /// Answer one question from the lexically closest sections.
    Qa {
        /// The question to answer.
        query: String,
    },
}

impl AnalysisMode {
    /// Parse a mode name, taking the query for `qa` from `query`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] for an unknown name or for `qa`
    /// without a non-empty query.
    pub fn parse(name: &str, query: Option<String>) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "comprehensive" => Ok(Self::Comprehensive),
            "summary" => Ok(Self::Summary),
            "specific" => Ok(Self::Specific),
            "qa" => match query {
                Some(query) if !query.trim().is_empty() => Ok(Self::Qa { query }),
                _ => Err(RagError::InvalidArgument("qa analysis requires a query".to_string())),
            },
            other => Err(RagError::InvalidArgument(format!(
                "unknown analysis mode '{other}', expected comprehensive, summary, specific or qa"
            ))),
        }
    }

    /// The mode name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Comprehensive => "comprehensive",
            Self::Summary => "summary",
            Self::Specific => "specific",
            Self::Qa { .. } => "qa",
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AnalysisMode {
    type Err = RagError;

    /// Parses every mode except `qa`, which needs a query.
    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, None)
    }
}

/// Structured elements pulled out of a legal document by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyElements {
    /// Contract, agreement, notice, etc.
    pub document_type: String,
    /// Parties involved.
    pub parties: Vec<String>,
    /// Important dates.
    pub key_dates: Vec<String>,
    /// Statutes and sections referenced.
    pub legal_provisions: Vec<String>,
    /// Key obligations.
    pub obligations: Vec<String>,
    /// Key rights.
    pub rights: Vec<String>,
    /// Monetary amounts.
    pub amounts: Vec<String>,
    /// Governing jurisdiction.
    pub jurisdiction: String,
    /// Why extraction failed, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for KeyElements {
    fn default() -> Self {
        Self::unknown(None)
    }
}

impl KeyElements {
    fn unknown(error: Option<String>) -> Self {
        Self {
            document_type: "unknown".to_string(),
            parties: Vec::new(),
            key_dates: Vec::new(),
            legal_provisions: Vec::new(),
            obligations: Vec::new(),
            rights: Vec::new(),
            amounts: Vec::new(),
            jurisdiction: "unknown".to_string(),
            error,
        }
    }

    /// Placeholder returned when extraction fails.
    pub fn failed(error: impl fmt::Display) -> Self {
        Self::unknown(Some(format!("Extraction failed: {error}")))
    }

    /// Parse a model reply, tolerating Markdown code fences around the JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Json`] if the reply is not a JSON object of the
    /// expected shape.
    pub fn from_reply(reply: &str) -> Result<Self> {
        let cleaned = reply.trim().replace("```json", "").replace("```", "");
        Ok(serde_json::from_str(cleaned.trim())?)
    }
}

/// Word-overlap score between a question and a chunk.
///
/// This is the size of the intersection of the two lowercase
/// whitespace-separated word sets. It is an unnormalised count and is not
/// comparable with vector similarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LexicalScore(pub usize);

impl LexicalScore {
    /// Score `text` against `query`.
    pub fn of(query: &str, text: &str) -> Self {
        let query_words: std::collections::HashSet<String> =
            query.split_whitespace().map(str::to_lowercase).collect();
        let text_words: std::collections::HashSet<String> =
            text.split_whitespace().map(str::to_lowercase).collect();
        Self(query_words.intersection(&text_words).count())
    }
}

/// Sections of `text` most relevant to `query` by word overlap.
///
/// The sort is stable, so equally scored sections keep document order.
pub fn lexical_top_chunks(text: &str, query: &str, chunk_size: usize, top: usize) -> Vec<String> {
    let mut scored: Vec<(LexicalScore, String)> =
        line_grouped(text, chunk_size).into_iter().map(|c| (LexicalScore::of(query, &c), c)).collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().take(top).map(|(_, c)| c).collect()
}

/// A completed analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// The mode that was run.
    pub mode: AnalysisMode,
    /// The generated analysis text.
    pub analysis: String,
    /// Extracted key elements; absent in `qa` mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_elements: Option<KeyElements>,
    /// Number of sections the document splits into (comprehensive mode).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_analyzed: Option<usize>,
    /// Number of sections passed to the model (qa mode).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_used: Option<usize>,
}

/// Result of `analyze_full_document`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    /// The analysis was generated.
    Completed(AnalysisReport),
    /// The main generation call failed.
    Failed {
        /// The mode that was attempted.
        mode: AnalysisMode,
        /// The generation error.
        error: String,
    },
}

/// Result of `identify_risks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RiskOutcome {
    /// The model produced a risk assessment.
    Assessed {
        /// Risks categorised by severity.
        risk_assessment: String,
    },
    /// The generation call failed.
    Failed {
        /// The generation error.
        error: String,
    },
}

fn compare_prompt(first: (&str, &str), second: (&str, &str)) -> String {
    format!(
        "Compare these two legal documents and provide a detailed analysis:\n\n\
         Document 1: {}\n{}...\n\n\
         Document 2: {}\n{}...\n\n\
         Provide a detailed comparison with:\n\
         1. Key Similarities\n\
         2. Key Differences\n\
         3. Conflicting Provisions (if any)\n\
         4. Complementary Aspects\n\
         5. Overall Assessment\n\n\
         Comparison:",
        first.0, first.1, second.0, second.1
    )
}

fn key_elements_prompt(text: &str) -> String {
    format!(
        "Extract key legal elements from this document and return ONLY valid JSON:\n\n\
         {text}\n\n\
         Extract:\n\
         {{\n  \"document_type\": \"type of document (contract/agreement/notice/etc)\",\n  \
         \"parties\": [\"list of parties involved\"],\n  \
         \"key_dates\": [\"important dates mentioned\"],\n  \
         \"legal_provisions\": [\"Indian laws/sections referenced\"],\n  \
         \"obligations\": [\"key obligations or duties\"],\n  \
         \"rights\": [\"key rights mentioned\"],\n  \
         \"amounts\": [\"monetary amounts mentioned\"],\n  \
         \"jurisdiction\": \"legal jurisdiction\"\n}}\n\n\
         Return ONLY the JSON object, no explanation."
    )
}

fn comprehensive_prompt(key_elements: &str, text: &str, truncated: bool) -> String {
    let marker = if truncated { TRUNCATION_MARKER } else { "" };
    format!(
        "As a legal expert specializing in Indian law, provide a comprehensive analysis of this legal document.\n\n\
         KEY ELEMENTS IDENTIFIED:\n{key_elements}\n\n\
         DOCUMENT CONTENT:\n{text}{marker}\n\n\
         Provide a detailed analysis with these sections:\n\n\
         1. DOCUMENT OVERVIEW - type, purpose, date and parties\n\
         2. LEGAL FRAMEWORK - applicable statutes, sections and compliance\n\
         3. KEY PROVISIONS ANALYSIS - main clauses, rights, obligations, conditions\n\
         4. RISK ASSESSMENT - legal risks, ambiguous clauses, missing provisions, enforceability\n\
         5. RECOMMENDATIONS - suggested actions, clauses needing attention, next steps\n\n\
         Format clearly with headers. Be specific and cite relevant Indian laws."
    )
}

fn summary_prompt(key_elements: &str, text: &str) -> String {
    format!(
        "Provide a concise executive summary of this legal document:\n\n\
         KEY ELEMENTS:\n{key_elements}\n\n\
         DOCUMENT (Preview):\n{text}\n\n\
         Summary should include:\n\
         - Document type and purpose (1-2 sentences)\n\
         - Parties involved\n\
         - Key terms and conditions (bullet points)\n\
         - Important dates and amounts\n\
         - Critical obligations\n\
         - Jurisdiction and applicable law\n\n\
         Keep it clear, concise, and actionable."
    )
}

fn specific_prompt(text: &str) -> String {
    format!(
        "Extract and list specific legal elements from this document:\n\n\
         {text}\n\n\
         Provide detailed lists for:\n\
         1. STATUTES AND ACTS REFERENCED\n\
         2. CASE LAW CITATIONS\n\
         3. LEGAL TERMS AND DEFINITIONS\n\
         4. CONTRACTUAL CLAUSES\n\
         5. COMPLIANCE REQUIREMENTS\n\
         6. DISPUTE RESOLUTION\n\
         7. TERMINATION PROVISIONS\n\n\
         Be precise and cite exact references."
    )
}

fn qa_prompt(context: &str, query: &str) -> String {
    format!(
        "Based on the following document excerpts, answer the question accurately and concisely.\n\n\
         DOCUMENT EXCERPTS:\n{context}\n\n\
         QUESTION: {query}\n\n\
         Provide a clear answer based ONLY on the document content. If the information is not \
         in the document, state that clearly. Cite specific parts of the document when possible.\n\n\
         ANSWER:"
    )
}

fn risks_prompt(text: &str) -> String {
    format!(
        "Analyze this legal document for potential risks and concerns:\n\n\
         {text}\n\n\
         Identify:\n\
         1. Legal risks\n\
         2. Compliance issues\n\
         3. Ambiguous clauses\n\
         4. Missing provisions\n\
         5. Unfavorable terms\n\n\
         Categorize each risk by severity: HIGH, MEDIUM, LOW"
    )
}

impl RagEngine {
    /// Compare two registered documents.
    ///
    /// Documents are looked up in argument order and the first missing one
    /// is reported. Each document contributes at most
    /// `config.compare_prefix_chars` characters to the prompt.
    ///
    /// # Errors
    ///
    /// Returns an error only if the registry cannot be read.
    pub fn compare(&self, doc_id1: &str, doc_id2: &str) -> Result<CompareOutcome> {
        let first = match self.get_document(doc_id1)? {
            Lookup::Found(doc) => doc,
            Lookup::NotFound { doc_id } => {
                return Ok(CompareOutcome::DocumentNotFound { doc_id, position: ComparePosition::First });
            }
        };
        let second = match self.get_document(doc_id2)? {
            Lookup::Found(doc) => doc,
            Lookup::NotFound { doc_id } => {
                return Ok(CompareOutcome::DocumentNotFound { doc_id, position: ComparePosition::Second });
            }
        };

        let limit = self.config.compare_prefix_chars;
        let prompt = compare_prompt(
            (&first.record.title, char_prefix(&first.content, limit)),
            (&second.record.title, char_prefix(&second.content, limit)),
        );
        let first_side =
            ComparedDocument { doc_id: first.record.doc_id.clone(), title: first.record.title.clone() };
        let second_side =
            ComparedDocument { doc_id: second.record.doc_id.clone(), title: second.record.title.clone() };

        debug!(doc.first = %doc_id1, doc.second = %doc_id2, model = self.generator.model_name(), "generating comparison");
        match self.generator.generate(&prompt, &GenerationParams::standard(&self.config)) {
            Ok(comparison) => {
                info!(doc.first = %doc_id1, doc.second = %doc_id2, "compared documents");
                Ok(CompareOutcome::Compared { first: first_side, second: second_side, comparison })
            }
            Err(e) => {
                warn!(doc.first = %doc_id1, doc.second = %doc_id2, error = %e, "comparison generation failed");
                let (a, b) = (first.record.stats(), second.record.stats());
                let fallback = format!(
                    "Basic comparison:\nDocument 1: {} words, {} chunks\nDocument 2: {} words, {} chunks",
                    a.words, a.chunks, b.words, b.chunks
                );
                Ok(CompareOutcome::GenerationFailed {
                    first: first_side,
                    second: second_side,
                    error: e.to_string(),
                    fallback,
                })
            }
        }
    }

    /// Analyse raw document text without indexing it.
    ///
    /// Every mode except `Qa` first extracts [`KeyElements`]; a failed
    /// extraction yields a placeholder and the analysis continues.
    pub fn analyze_full_document(&self, text: &str, mode: &AnalysisMode) -> AnalysisOutcome {
        if let AnalysisMode::Qa { query } = mode {
            return self.answer_from_text(text, query, mode);
        }

        let key_elements = self.extract_key_elements(text);
        let rendered = serde_json::to_string_pretty(&key_elements).unwrap_or_default();

        let (prompt, params, chunks_analyzed) = match mode {
            AnalysisMode::Comprehensive => {
                let prefix = char_prefix(text, COMPREHENSIVE_PREFIX_CHARS);
                let truncated = prefix.len() < text.len();
                let sections = line_grouped(text, ANALYSIS_CHUNK_SIZE).len();
                (
                    comprehensive_prompt(&rendered, prefix, truncated),
                    GenerationParams::standard(&self.config),
                    Some(sections),
                )
            }
            AnalysisMode::Summary => (
                summary_prompt(&rendered, char_prefix(text, SUMMARY_PREFIX_CHARS)),
                GenerationParams::fast(),
                None,
            ),
            AnalysisMode::Specific | AnalysisMode::Qa { .. } => (
                specific_prompt(char_prefix(text, SPECIFIC_PREFIX_CHARS)),
                GenerationParams::standard(&self.config),
                None,
            ),
        };

        match self.generator.generate(&prompt, &params) {
            Ok(analysis) => {
                info!(mode = mode.name(), text_len = text.len(), "analysed document");
                AnalysisOutcome::Completed(AnalysisReport {
                    mode: mode.clone(),
                    analysis,
                    key_elements: Some(key_elements),
                    chunks_analyzed,
                    chunks_used: None,
                })
            }
            Err(e) => {
                warn!(mode = mode.name(), error = %e, "analysis generation failed");
                AnalysisOutcome::Failed { mode: mode.clone(), error: e.to_string() }
            }
        }
    }

    /// Produce a severity-categorised risk assessment of `text`.
    pub fn identify_risks(&self, text: &str) -> RiskOutcome {
        match self.generator.generate(&risks_prompt(text), &GenerationParams::standard(&self.config)) {
            Ok(risk_assessment) => {
                info!(text_len = text.len(), "identified risks");
                RiskOutcome::Assessed { risk_assessment }
            }
            Err(e) => {
                warn!(error = %e, "risk assessment generation failed");
                RiskOutcome::Failed { error: e.to_string() }
            }
        }
    }

    fn extract_key_elements(&self, text: &str) -> KeyElements {
        let prompt = key_elements_prompt(char_prefix(text, KEY_ELEMENTS_PREFIX_CHARS));
        let parsed = self
            .generator
            .generate(&prompt, &GenerationParams::fast())
            .and_then(|reply| KeyElements::from_reply(&reply));
        match parsed {
            Ok(elements) => elements,
            Err(e) => {
                warn!(error = %e, "key element extraction failed");
                KeyElements::failed(e)
            }
        }
    }

    fn answer_from_text(&self, text: &str, query: &str, mode: &AnalysisMode) -> AnalysisOutcome {
        let relevant = lexical_top_chunks(text, query, QA_CHUNK_SIZE, QA_TOP_CHUNKS);
        let context = relevant.join(QA_SEPARATOR);

        match self.generator.generate(&qa_prompt(&context, query), &GenerationParams::qa()) {
            Ok(analysis) => {
                info!(mode = "qa", chunks_used = relevant.len(), "answered from document text");
                AnalysisOutcome::Completed(AnalysisReport {
                    mode: mode.clone(),
                    analysis,
                    key_elements: None,
                    chunks_analyzed: None,
                    chunks_used: Some(relevant.len()),
                })
            }
            Err(e) => {
                warn!(mode = "qa", error = %e, "analysis generation failed");
                AnalysisOutcome::Failed { mode: mode.clone(), error: e.to_string() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_prefix_respects_multibyte_boundaries() {
        assert_eq!(char_prefix("§§§§", 2), "§§");
        assert_eq!(char_prefix("abc", 10), "abc");
        assert_eq!(char_prefix("abc", 0), "");
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("Summary".parse::<AnalysisMode>().unwrap(), AnalysisMode::Summary);
        assert!("qa".parse::<AnalysisMode>().is_err());
        assert!(AnalysisMode::parse("qa", Some("  ".into())).is_err());
        assert!(AnalysisMode::parse("poetry", None).is_err());
        assert_eq!(
            AnalysisMode::parse("qa", Some("Who pays?".into())).unwrap(),
            AnalysisMode::Qa { query: "Who pays?".into() }
        );
    }

    #[test]
    fn key_elements_tolerate_fences_and_missing_fields() {
        let reply = "```json\n{\"document_type\": \"lease\", \"parties\": [\"A\", \"B\"]}\n```";
        let elements = KeyElements::from_reply(reply).unwrap();
        assert_eq!(elements.document_type, "lease");
        assert_eq!(elements.parties, vec!["A", "B"]);
        assert_eq!(elements.jurisdiction, "unknown");
        assert!(elements.error.is_none());

        assert!(KeyElements::from_reply("I cannot help with that.").is_err());
        let failed = KeyElements::failed("bad json");
        assert_eq!(failed.error.as_deref(), Some("Extraction failed: bad json"));
    }

    #[test]
    fn lexical_score_counts_distinct_shared_words() {
        assert_eq!(LexicalScore::of("Notice notice period", "the NOTICE period is long"), LexicalScore(2));
        assert_eq!(LexicalScore::of("payment", "termination clause"), LexicalScore(0));
    }

    #[test]
    fn lexical_top_chunks_keeps_document_order_on_ties() {
        let text = "alpha clause\nbeta clause\ngamma clause";
        let top = lexical_top_chunks(text, "clause", 14, 2);
        assert_eq!(top, vec!["alpha clause", "beta clause"]);
    }
}
