//! Conform — keep an installation in line with a remote manifest.
//!
//! # Usage
//!
//! ```text
//! conform init --manifest-url <URL> --base-url <URL> [--destination DIR] [--donor-root DIR] [--force]
//! conform sync [--config FILE] [--destination DIR] [--donor-root DIR | --no-donor] [--json]
//! conform verify [--config FILE] [--destination DIR] [--json]
//! ```

mod commands;
mod donor;
mod log_rotation;
mod logging;
mod progress;
mod runtime;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{init::InitArgs, sync::SyncArgs, verify::VerifyArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "conform",
    version,
    about = "Verify and repair an installation against a remote file manifest",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a conform.yaml for an installation.
    Init(InitArgs),

    /// Fetch, copy or repair files until the destination matches the manifest.
    Sync(SyncArgs),

    /// Check the destination against the manifest without changing anything.
    Verify(VerifyArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Sync(args) => args.run(),
        Commands::Verify(args) => args.run(),
    }
}
