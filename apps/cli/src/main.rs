//! Enricher CLI: company spreadsheet enrichment.
//!
//! Reads a CSV of company URLs, queries the configured data providers and
//! writes the enriched report.

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
