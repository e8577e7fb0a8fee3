//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use luminary_rag::{ChunkingStrategy, RagConfig};

use crate::telemetry::LogFormat;

/// Legal-document retrieval from the command line.
#[derive(Debug, Parser)]
#[command(name = "luminary", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every subcommand. Each one overrides the matching
/// environment variable.
#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Directory holding the registry and the vector index.
    #[arg(long, global = true)]
    pub storage: Option<PathBuf>,

    /// Maximum chunk size in characters.
    #[arg(long, global = true)]
    pub chunk_size: Option<usize>,

    /// Chunk overlap budget in characters.
    #[arg(long, global = true)]
    pub chunk_overlap: Option<usize>,

    /// Chunking strategy used when ingesting.
    #[arg(long, value_enum, global = true, default_value_t = ChunkingArg::Paragraph)]
    pub chunking: ChunkingArg,

    /// Embedding backend.
    #[arg(long, value_enum, global = true, default_value_t = EmbedderArg::Hashing)]
    pub embedder: EmbedderArg,

    /// Language model name.
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Log record format on stderr.
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl GlobalArgs {
    /// Apply the command-line overrides on top of `config`.
    pub fn apply(&self, config: RagConfig) -> luminary_rag::Result<RagConfig> {
        let mut builder = RagConfig::builder()
            .storage_path(self.storage.clone().unwrap_or(config.storage_path))
            .chunk_size(self.chunk_size.unwrap_or(config.chunk_size))
            .chunk_overlap(self.chunk_overlap.unwrap_or(config.chunk_overlap))
            .search_top_k(config.search_top_k)
            .grouped_top_k(config.grouped_top_k)
            .answer_top_k(config.answer_top_k)
            .compare_prefix_chars(config.compare_prefix_chars)
            .embedding_dimensions(config.embedding_dimensions)
            .temperature(config.temperature)
            .max_output_tokens(config.max_output_tokens)
            .llm_model(config.llm_model);
        if let Some(model) = &self.model {
            builder = builder.llm_model(model.clone());
        }
        builder.build()
    }
}

/// Chunking strategies selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChunkingArg {
    /// Pack paragraphs with word overlap.
    Paragraph,
    /// Slide a fixed character window.
    Fixed,
}

impl From<ChunkingArg> for ChunkingStrategy {
    fn from(arg: ChunkingArg) -> Self {
        match arg {
            ChunkingArg::Paragraph => Self::ParagraphAware,
            ChunkingArg::Fixed => Self::FixedWindow,
        }
    }
}

/// Embedding backends selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderArg {
    /// Offline feature hashing.
    Hashing,
    /// OpenAI embeddings API (`OPENAI_API_KEY`).
    #[cfg(feature = "openai")]
    #[value(name = "openai")]
    OpenAi,
}

/// Analysis modes selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AnalysisModeArg {
    Comprehensive,
    Summary,
    Specific,
    Qa,
}

impl AnalysisModeArg {
    /// The mode name understood by the engine.
    pub fn name(self) -> &'static str {
        match self {
            Self::Comprehensive => "comprehensive",
            Self::Summary => "summary",
            Self::Specific => "specific",
            Self::Qa => "qa",
        }
    }
}

/// Where the text for an analysis comes from.
#[derive(Debug, Clone, Args)]
#[group(required = true, multiple = false)]
pub struct TextSource {
    /// A registered document id.
    #[arg(long = "doc")]
    pub doc_id: Option<String>,

    /// A text file on disk.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ingest a text file.
    Add {
        /// File to read.
        path: PathBuf,
        /// Document title; defaults to the file name.
        #[arg(long)]
        title: Option<String>,
        /// Explicit document id; derived from the content when omitted.
        #[arg(long)]
        id: Option<String>,
        /// Metadata entry as `key=value`. Repeatable.
        #[arg(long = "meta", value_parser = parse_key_value)]
        metadata: Vec<(String, String)>,
        /// Ingest the file as-is instead of normalising whitespace first.
        #[arg(long)]
        raw: bool,
    },
    /// List registered documents.
    List,
    /// Show one document.
    Get {
        doc_id: String,
        /// Also print the document's chunks.
        #[arg(long)]
        chunks: bool,
    },
    /// Delete a document and its chunks.
    Delete { doc_id: String },
    /// Search chunks, optionally inside one document.
    Search {
        query: String,
        /// Number of results; defaults to the configured value.
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Restrict the search to this document id.
        #[arg(long = "doc")]
        doc_id: Option<String>,
    },
    /// Search every document and group hits by document.
    SearchAll {
        query: String,
        /// Number of documents; defaults to the configured value.
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Answer a question from one document.
    Ask { doc_id: String, question: String },
    /// Compare two documents.
    Compare { first: String, second: String },
    /// Analyse a whole document.
    Analyze {
        #[command(flatten)]
        source: TextSource,
        /// Analysis mode.
        #[arg(long, value_enum, default_value_t = AnalysisModeArg::Comprehensive)]
        mode: AnalysisModeArg,
        /// Question for `qa` mode.
        #[arg(long)]
        query: Option<String>,
    },
    /// List legal risks in a document.
    Risks {
        #[command(flatten)]
        source: TextSource,
    },
    /// Show corpus statistics.
    Stats,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) =
        raw.split_once('=').ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty metadata key in '{raw}'"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_work_after_the_subcommand() {
        let cli = Cli::try_parse_from([
            "luminary", "search", "notice period", "-k", "3", "--doc", "d1", "--json",
            "--storage", "/tmp/lum",
        ])
        .unwrap();
        assert!(cli.global.json);
        assert_eq!(cli.global.storage, Some(PathBuf::from("/tmp/lum")));
        match cli.command {
            Command::Search { query, top_k, doc_id } => {
                assert_eq!(query, "notice period");
                assert_eq!(top_k, Some(3));
                assert_eq!(doc_id.as_deref(), Some("d1"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn metadata_pairs_are_split_on_the_first_equals() {
        let cli = Cli::try_parse_from([
            "luminary", "add", "lease.txt", "--meta", "court=High Court", "--meta", "ref=a=b",
        ])
        .unwrap();
        let Command::Add { metadata, .. } = cli.command else { panic!("expected add") };
        assert_eq!(
            metadata,
            vec![("court".into(), "High Court".into()), ("ref".into(), "a=b".into())]
        );
        assert!(Cli::try_parse_from(["luminary", "add", "x.txt", "--meta", "novalue"]).is_err());
    }

    #[test]
    fn analysis_needs_exactly_one_source() {
        assert!(Cli::try_parse_from(["luminary", "risks"]).is_err());
        assert!(
            Cli::try_parse_from(["luminary", "risks", "--doc", "d1", "--file", "a.txt"]).is_err()
        );
        let cli =
            Cli::try_parse_from(["luminary", "analyze", "--doc", "d1", "--mode", "qa", "--query", "rent?"])
                .unwrap();
        let Command::Analyze { source, mode, query } = cli.command else { panic!("expected analyze") };
        assert_eq!(source.doc_id.as_deref(), Some("d1"));
        assert_eq!(mode, AnalysisModeArg::Qa);
        assert_eq!(query.as_deref(), Some("rent?"));
    }

    #[test]
    fn overrides_replace_only_what_was_given() {
        let cli = Cli::try_parse_from(["luminary", "--chunk-size", "800", "--model", "m", "stats"]).unwrap();
        let config = cli.global.apply(RagConfig::default()).unwrap();
        assert_eq!(config.chunk_size, 800);
        assert_eq!(config.llm_model, "m");
        assert_eq!(config.chunk_overlap, RagConfig::default().chunk_overlap);
        assert_eq!(config.storage_path, RagConfig::default().storage_path);
    }
}
