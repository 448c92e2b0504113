//! pokespin CLI: enrich an item table with types and base stats.
//!
//! Reads a CSV item table, fills in type labels and base stats from PokeAPI
//! (or its CSV dumps), and publishes the result atomically with a backup.

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
