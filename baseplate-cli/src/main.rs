//! Baseplate: merge-aware sync of generated files into app directories.
//!
//! # Usage
//!
//! ```text
//! baseplate snapshot add <app> <files>... [--deleted] [--snapshot-dir D] [--project P]
//! baseplate snapshot remove <app> <files>... [--snapshot-dir D] [--project P]
//! baseplate snapshot show <app> [--json] [--project P]
//! baseplate diff <app> [--project P]
//! baseplate status <app> [--json] [--project P]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{diff::DiffArgs, snapshot::SnapshotCommand, status::StatusArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "baseplate",
    version,
    about = "Keep generated app files in sync without losing local edits",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record local edits so the next generation reapplies them.
    Snapshot {
        #[command(subcommand)]
        command: SnapshotCommand,
    },

    /// Show unified diffs of working copies against the last generation.
    Diff(DiffArgs),

    /// Show which generated files were modified or removed locally.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    baseplate_worker::init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Snapshot { command } => commands::snapshot::run(command),
        Commands::Diff(args) => args.run(),
        Commands::Status(args) => args.run(),
    }
}
