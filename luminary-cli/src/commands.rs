//! Builds the engine and runs one subcommand against it.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use luminary_rag::chunking::clean_text;
use luminary_rag::{
    AddOutcome, AnalysisMode, AnalysisOutcome, AnswerOutcome, Chunker, ChunkingStrategy, CompareOutcome,
    DisabledGenerator, EmbeddingProvider, FileRegistry, FixedWindowChunker, HashingEmbeddingProvider,
    Lookup, ManagedEmbedder, NewDocument, PersistentVectorIndex, RagConfig, RagEngine, RagService,
    RiskOutcome, SearchHit, TextGenerator,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::cli::{Command, EmbedderArg, GlobalArgs, TextSource};

/// Window used for the chunk-count preview printed by `add`.
pub const PREVIEW_CHUNK_SIZE: usize = 1000;
/// Overlap used for the chunk-count preview printed by `add`.
pub const PREVIEW_OVERLAP: usize = 200;

const SNIPPET_CHARS: usize = 200;

/// Rendered result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    /// Text for stdout.
    pub text: String,
    /// False for expected failures (not found, duplicate, failed generation).
    pub success: bool,
}

impl Output {
    fn ok(text: impl Into<String>) -> Self {
        Self { text: text.into(), success: true }
    }

    fn failed(text: impl Into<String>) -> Self {
        Self { text: text.into(), success: false }
    }

    fn with_success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }
}

/// Open the file-backed engine described by `config`.
pub fn build_engine(config: RagConfig, global: &GlobalArgs) -> Result<RagEngine> {
    let embedder = embedding_provider(&config, global.embedder);
    let generator = text_generator(&config)?;
    let strategy = ChunkingStrategy::from(global.chunking);
    let chunker = strategy.chunker(config.chunk_size, config.chunk_overlap);

    let registry = FileRegistry::open(config.registry_path())
        .with_context(|| format!("opening registry at {}", config.registry_path().display()))?;
    let index = PersistentVectorIndex::open(config.index_path())
        .with_context(|| format!("opening vector index at {}", config.index_path().display()))?;

    info!(
        storage = %config.storage_path.display(),
        chunking = %strategy,
        embedder = embedder.model_name(),
        model = generator.model_name(),
        "engine ready"
    );

    Ok(RagEngine::builder()
        .embedding_provider(embedder)
        .generator(generator)
        .registry(Arc::new(registry))
        .vector_index(Arc::new(index))
        .chunker(chunker)
        .config(config)
        .build()?)
}

fn embedding_provider(config: &RagConfig, kind: EmbedderArg) -> Arc<dyn EmbeddingProvider> {
    match kind {
        EmbedderArg::Hashing => {
            let dims = config.embedding_dimensions;
            Arc::new(ManagedEmbedder::new("hashing", dims, move || {
                Ok(Arc::new(HashingEmbeddingProvider::new(dims)) as Arc<dyn EmbeddingProvider>)
            }))
        }
        #[cfg(feature = "openai")]
        EmbedderArg::OpenAi => {
            let dims = config.embedding_dimensions;
            Arc::new(ManagedEmbedder::new("openai", dims, move || {
                let provider = luminary_rag::openai::OpenAIEmbeddingProvider::from_env()?.with_dimensions(dims);
                Ok(Arc::new(provider) as Arc<dyn EmbeddingProvider>)
            }))
        }
    }
}

#[cfg(feature = "gemini")]
fn text_generator(config: &RagConfig) -> Result<Arc<dyn TextGenerator>> {
    if std::env::var("GOOGLE_API_KEY").is_err() {
        warn!("GOOGLE_API_KEY is not set; answers and analyses will report generation failures");
        return Ok(Arc::new(DisabledGenerator));
    }
    let generator = luminary_rag::gemini::GeminiGenerator::from_env()?.with_model(config.llm_model.clone());
    Ok(Arc::new(generator))
}

#[cfg(not(feature = "gemini"))]
fn text_generator(config: &RagConfig) -> Result<Arc<dyn TextGenerator>> {
    warn!(model = %config.llm_model, "built without a language model; generation is disabled");
    Ok(Arc::new(DisabledGenerator))
}

/// Run `command` and render its result, as JSON when `json` is set.
pub async fn execute(service: &RagService, command: Command, json: bool) -> Result<Output> {
    let config = service.engine().config().clone();
    match command {
        Command::Add { path, title, id, metadata, raw } => {
            let text = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let content = if raw { text } else { clean_text(&text) };
            let preview = FixedWindowChunker::new(PREVIEW_CHUNK_SIZE, PREVIEW_OVERLAP).chunk(&content).len();

            let title = title.unwrap_or_else(|| file_label(&path));
            let mut document = NewDocument::new(content, title).with_metadata("source_file", file_label(&path));
            for (key, value) in metadata {
                document = document.with_metadata(key, value);
            }
            if let Some(id) = id {
                document = document.with_id(id);
            }

            let outcome = service.add_document(document).await?;
            let success = outcome.is_added();
            let output = if json {
                let mut value = serde_json::to_value(&outcome)?;
                value["preview_chunks"] = json!(preview);
                pretty(&value)?
            } else {
                match &outcome {
                    AddOutcome::Added { doc_id, chunks_created } => format!(
                        "Added '{doc_id}' with {chunks_created} chunks ({preview} fixed-window chunks of {PREVIEW_CHUNK_SIZE} chars)"
                    ),
                    AddOutcome::Duplicate { doc_id } => format!("Document '{doc_id}' already exists"),
                    AddOutcome::EmptyDocument { doc_id } => {
                        format!("Document '{doc_id}' has no text to index")
                    }
                }
            };
            Ok(Output { text: output, success })
        }

        Command::List => {
            let documents = service.list_documents().await?;
            if json {
                return Ok(Output::ok(pretty(&documents)?));
            }
            if documents.is_empty() {
                return Ok(Output::ok("No documents."));
            }
            let lines: Vec<String> = documents
                .iter()
                .map(|d| {
                    format!(
                        "{}  {}  ({} words, {} chunks, added {})",
                        d.doc_id,
                        d.title,
                        d.words,
                        d.chunks,
                        d.added_at.format("%Y-%m-%d %H:%M")
                    )
                })
                .collect();
            Ok(Output::ok(lines.join("\n")))
        }

        Command::Get { doc_id, chunks } => {
            let document = match service.get_document(doc_id).await? {
                Lookup::Found(document) => document,
                Lookup::NotFound { doc_id } => return Ok(not_found(&doc_id, json)),
            };
            let chunk_list = if chunks {
                service.document_chunks(document.record.doc_id.clone()).await?.found()
            } else {
                None
            };

            if json {
                let mut value = serde_json::to_value(&document)?;
                if let Some(chunk_list) = &chunk_list {
                    value["chunks"] = json!(chunk_list
                        .iter()
                        .map(|c| json!({ "id": c.id, "sequence_index": c.sequence_index, "text": c.text }))
                        .collect::<Vec<_>>());
                }
                return Ok(Output::ok(pretty(&value)?));
            }

            let record = &document.record;
            let stats = record.stats();
            let mut text = format!(
                "{} ({})\n{} words, {} characters, {} chunks\n\n{}",
                record.title, record.doc_id, stats.words, stats.characters, stats.chunks, document.content
            );
            for chunk in chunk_list.iter().flatten() {
                text.push_str(&format!("\n\n--- chunk {} ---\n{}", chunk.sequence_index, chunk.text));
            }
            Ok(Output::ok(text))
        }

        Command::Delete { doc_id } => match service.delete_document(doc_id).await? {
            Lookup::Found(deleted) if json => Ok(Output::ok(pretty(&deleted)?)),
            Lookup::Found(deleted) => Ok(Output::ok(format!(
                "Deleted '{}' ({}) and {} chunks",
                deleted.title, deleted.doc_id, deleted.chunks_deleted
            ))),
            Lookup::NotFound { doc_id } => Ok(not_found(&doc_id, json)),
        },

        Command::Search { query, top_k, doc_id } => {
            let response = service.search(query, top_k.unwrap_or(config.search_top_k), doc_id).await?;
            if json {
                return Ok(Output::ok(pretty(&response)?));
            }
            if response.results.is_empty() {
                return Ok(Output::ok(format!("No results for '{}'.", response.query)));
            }
            let lines: Vec<String> =
                response.results.iter().enumerate().map(|(rank, hit)| render_hit(rank + 1, hit)).collect();
            Ok(Output::ok(lines.join("\n")))
        }

        Command::SearchAll { query, top_k } => {
            let groups = service.search_all_grouped(query.clone(), top_k.unwrap_or(config.grouped_top_k)).await?;
            if json {
                return Ok(Output::ok(pretty(&groups)?));
            }
            if groups.is_empty() {
                return Ok(Output::ok(format!("No results for '{query}'.")));
            }
            let mut text = String::new();
            for (rank, group) in groups.iter().enumerate() {
                if rank > 0 {
                    text.push('\n');
                }
                text.push_str(&format!(
                    "{}. {} ({})  best {:.3}, {} matching chunks\n",
                    rank + 1,
                    group.title,
                    group.doc_id,
                    group.max_similarity,
                    group.chunk_count
                ));
                for hit in &group.top_chunks {
                    text.push_str(&format!("   [{:.3}] {}\n", hit.similarity, snippet(&hit.text)));
                }
            }
            Ok(Output::ok(text.trim_end()))
        }

        Command::Ask { doc_id, question } => {
            let outcome = service.answer_question(doc_id, question).await?;
            let success = matches!(outcome, AnswerOutcome::Answered { .. });
            if json {
                return Ok(Output::ok(pretty(&outcome)?).with_success(success));
            }
            let text = match &outcome {
                AnswerOutcome::DocumentNotFound { doc_id } => format!("Document '{doc_id}' not found"),
                AnswerOutcome::NoRelevantContent { doc_id } => {
                    format!("No relevant content found in document '{doc_id}'")
                }
                AnswerOutcome::Answered { .. } | AnswerOutcome::GenerationFailed { .. } => {
                    let mut text = outcome.display_text().unwrap_or_default();
                    text.push_str("\n\nSources:");
                    for (rank, hit) in outcome.sources().iter().enumerate() {
                        text.push('\n');
                        text.push_str(&render_hit(rank + 1, hit));
                    }
                    text
                }
            };
            Ok(Output { text, success })
        }

        Command::Compare { first, second } => {
            let outcome = service.compare(first, second).await?;
            let success = matches!(outcome, CompareOutcome::Compared { .. });
            if json {
                return Ok(Output::ok(pretty(&outcome)?).with_success(success));
            }
            let text = match outcome {
                CompareOutcome::Compared { first, second, comparison } => format!(
                    "{} ({}) vs {} ({})\n\n{comparison}",
                    first.title, first.doc_id, second.title, second.doc_id
                ),
                CompareOutcome::DocumentNotFound { doc_id, position } => {
                    format!("Document {} ('{doc_id}') not found", position.ordinal())
                }
                CompareOutcome::GenerationFailed { error, fallback, .. } => {
                    format!("Error generating comparison: {error}\n\n{fallback}")
                }
            };
            Ok(Output { text, success })
        }

        Command::Analyze { source, mode, query } => {
            let mode = AnalysisMode::parse(mode.name(), query)?;
            let text = match load_text(service, &source).await? {
                Ok(text) => text,
                Err(doc_id) => return Ok(not_found(&doc_id, json)),
            };
            let outcome = service.analyze_full_document(text, mode).await?;
            let success = matches!(outcome, AnalysisOutcome::Completed(_));
            if json {
                return Ok(Output::ok(pretty(&outcome)?).with_success(success));
            }
            let text = match outcome {
                AnalysisOutcome::Completed(report) => {
                    let mut text = format!("Analysis ({})\n", report.mode);
                    if let Some(elements) = &report.key_elements {
                        text.push_str(&format!(
                            "Type: {}  Jurisdiction: {}\nParties: {}\n",
                            elements.document_type,
                            elements.jurisdiction,
                            if elements.parties.is_empty() { "-".to_string() } else { elements.parties.join(", ") }
                        ));
                        if let Some(error) = &elements.error {
                            text.push_str(&format!("Key elements: {error}\n"));
                        }
                    }
                    if let Some(n) = report.chunks_analyzed {
                        text.push_str(&format!("Sections analysed: {n}\n"));
                    }
                    if let Some(n) = report.chunks_used {
                        text.push_str(&format!("Sections used: {n}\n"));
                    }
                    text.push('\n');
                    text.push_str(&report.analysis);
                    text
                }
                AnalysisOutcome::Failed { mode, error } => format!("{mode} analysis failed: {error}"),
            };
            Ok(Output { text, success })
        }

        Command::Risks { source } => {
            let text = match load_text(service, &source).await? {
                Ok(text) => text,
                Err(doc_id) => return Ok(not_found(&doc_id, json)),
            };
            let outcome = service.identify_risks(text).await?;
            let success = matches!(outcome, RiskOutcome::Assessed { .. });
            if json {
                return Ok(Output::ok(pretty(&outcome)?).with_success(success));
            }
            let text = match outcome {
                RiskOutcome::Assessed { risk_assessment } => risk_assessment,
                RiskOutcome::Failed { error } => format!("Risk assessment failed: {error}"),
            };
            Ok(Output { text, success })
        }

        Command::Stats => {
            let stats = service.get_statistics().await?;
            if json {
                return Ok(Output::ok(pretty(&stats)?));
            }
            Ok(Output::ok(format!(
                "Documents: {}\nChunks: {}\nWords: {}",
                stats.total_documents, stats.total_chunks, stats.total_words
            )))
        }
    }
}

/// Resolve the text an analysis runs on. `Err` carries an unknown doc id.
async fn load_text(service: &RagService, source: &TextSource) -> Result<std::result::Result<String, String>> {
    if let Some(doc_id) = &source.doc_id {
        return Ok(match service.get_document(doc_id.clone()).await? {
            Lookup::Found(document) => Ok(document.content),
            Lookup::NotFound { doc_id } => Err(doc_id),
        });
    }
    let path = source.file.as_deref().context("either --doc or --file is required")?;
    let text =
        tokio::fs::read_to_string(path).await.with_context(|| format!("reading {}", path.display()))?;
    Ok(Ok(clean_text(&text)))
}

fn not_found(doc_id: &str, json: bool) -> Output {
    if json {
        Output::failed(json!({ "status": "not_found", "doc_id": doc_id }).to_string())
    } else {
        Output::failed(format!("Document '{doc_id}' not found"))
    }
}

fn render_hit(rank: usize, hit: &SearchHit) -> String {
    format!(
        "{rank}. [{:.3}] {} ({})\n   {}",
        hit.similarity,
        hit.doc_title,
        hit.chunk_id,
        snippet(&hit.text)
    )
}

fn snippet(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SNIPPET_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(SNIPPET_CHARS).collect();
    format!("{cut}...")
}

fn file_label(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| path.display().to_string())
}

fn pretty<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippets_flatten_and_truncate() {
        assert_eq!(snippet("Rent  is\n due."), "Rent is due.");
        let long = "word ".repeat(100);
        let cut = snippet(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), SNIPPET_CHARS + 3);
    }

    #[test]
    fn file_label_uses_the_file_name() {
        assert_eq!(file_label(Path::new("/data/contracts/lease.txt")), "lease.txt");
    }

    #[test]
    fn not_found_json_names_the_id() {
        let output = not_found("d9", true);
        assert!(!output.success);
        let value: serde_json::Value = serde_json::from_str(&output.text).unwrap();
        assert_eq!(value["doc_id"], "d9");
        assert_eq!(value["status"], "not_found");
    }
}
