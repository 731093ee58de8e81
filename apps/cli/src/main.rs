//! ohpm-atlas CLI — OHPM registry crawler and package categorizer.
//!
//! Fetches the full registry catalog, assigns every package to topical
//! categories, and publishes a snapshot consumed by the search tooling.

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
