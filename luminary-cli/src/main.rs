use std::process::ExitCode;

use clap::Parser;
use luminary_cli::telemetry::DEFAULT_LOG_FILTER;
use luminary_cli::{Cli, init_logging, run};
use luminary_rag::RagConfig;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.global.log_format, DEFAULT_LOG_FILTER);

    let output = run(cli, RagConfig::from_env()?).await?;
    println!("{}", output.text);
    Ok(if output.success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
