//! Command-line front end for the Luminary retrieval engine.
//!
//! The binary loads `.env`, reads [`RagConfig::from_env`], applies command-line
//! overrides, opens the file-backed engine and runs one subcommand through the
//! async [`RagService`].

pub mod cli;
pub mod commands;
pub mod telemetry;

use std::sync::Arc;

use anyhow::Result;
use luminary_rag::{RagConfig, RagService};

pub use cli::{Cli, Command, GlobalArgs};
pub use commands::{Output, build_engine, execute};
pub use telemetry::{LogFormat, init_logging};

/// Run a parsed command line against the configuration `base`.
pub async fn run(cli: Cli, base: RagConfig) -> Result<Output> {
    let config = cli.global.apply(base)?;
    let engine = build_engine(config, &cli.global)?;
    let service = RagService::new(Arc::new(engine));
    execute(&service, cli.command, cli.global.json).await
}
