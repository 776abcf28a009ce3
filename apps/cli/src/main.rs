//! mparchive CLI: archive a public account's articles for offline reading.
//!
//! Resolves an account by name or article link, lists its articles by count
//! or date range, and saves each one as a self-contained HTML file.

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
