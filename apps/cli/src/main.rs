//! annodemo CLI — demo data loader for the annotation backend.
//!
//! Downloads public documents, uploads them as chunked resources with a
//! linked table of contents, annotates legal citations and validates the
//! result through the backend's event history.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    // The dashboard logs to a file; stdout belongs to the terminal UI.
    if !cli.interactive {
        commands::init_tracing(&cli);
    }
    commands::run(cli).await
}
