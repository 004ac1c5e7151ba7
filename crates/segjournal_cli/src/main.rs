//! SegJournal CLI
//!
//! Command-line tools for SegJournal journal directories.
//!
//! # Commands
//!
//! - `inspect` - Display segment metadata and entry counts
//! - `verify` - Verify segment integrity and alignment
//! - `dump` - Print entries for debugging
//! - `compact` - Delete segments before an index

mod commands;

use clap::{Parser, Subcommand};
use segjournal_core::config::{DEFAULT_MAX_ENTRY_SIZE, DEFAULT_NAME};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// SegJournal command-line journal tools.
#[derive(Parser)]
#[command(name = "segjournal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the journal directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Journal name (segment files are `<name>-<id>.log`)
    #[arg(global = true, short, long, default_value = DEFAULT_NAME)]
    name: String,

    /// Largest entry payload the journal was written with
    #[arg(global = true, long, default_value_t = DEFAULT_MAX_ENTRY_SIZE)]
    max_entry_size: u32,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display segment metadata and entry counts
    Inspect {
        /// Show per-segment details
        #[arg(short, long)]
        segments: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify segment integrity and alignment
    Verify,

    /// Print entries for debugging
    Dump {
        /// First index to print
        #[arg(long, default_value = "1")]
        from: u64,

        /// Maximum number of entries to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Delete whole segments that end before an index
    Compact {
        /// Index that must remain readable
        index: u64,

        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let max_entry_size = cli.max_entry_size as usize;
    match cli.command {
        Commands::Inspect { segments, format } => {
            let path = cli.path.ok_or("Journal path required for inspect")?;
            commands::inspect::run(&path, &cli.name, max_entry_size, segments, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Journal path required for verify")?;
            commands::verify::run(&path, &cli.name, max_entry_size)?;
        }
        Commands::Dump {
            from,
            limit,
            format,
        } => {
            let path = cli.path.ok_or("Journal path required for dump")?;
            commands::dump::run(&path, &cli.name, max_entry_size, from, limit, &format)?;
        }
        Commands::Compact { index, dry_run } => {
            let path = cli.path.ok_or("Journal path required for compact")?;
            commands::compact::run(&path, &cli.name, cli.max_entry_size, index, dry_run)?;
        }
        Commands::Version => {
            println!("SegJournal CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("SegJournal Core v{}", segjournal_core::VERSION);
        }
    }

    Ok(())
}
