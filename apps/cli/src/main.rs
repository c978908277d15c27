//! Enrichment CLI: classify, score, and scan chat messages.
//!
//! Submits single messages and batches to the enrichment pipeline, polls
//! batch status, and runs queue workers.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
