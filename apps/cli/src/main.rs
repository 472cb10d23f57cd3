//! SiteForge CLI: turn a business brief into a landing-site blueprint.
//!
//! Validates the brief, runs the architect, copywriter, visual, and
//! integration stages, and writes the aggregate result as JSON.

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
