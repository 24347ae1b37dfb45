//! Templet - compile declarative templates and render them from the command line.

mod cli;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    templet::logger::set_verbose(cli.verbose);

    let config = cli::run::load_config(&cli)?;
    cli::run::run(&cli, config).await
}
