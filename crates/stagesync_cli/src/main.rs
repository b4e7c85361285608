//! Stagesync CLI
//!
//! Command-line tools for staging task files.
//!
//! # Commands
//!
//! - `inspect` - Display the tables, seeds and binaries of a task file
//! - `pack` - Build a task file from a JSON description
//! - `verify` - Check a task file against the tables its kind requires

mod commands;
mod task_file;

use clap::{Parser, Subcommand};
use stagesync_core::TaskKind;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Stagesync command-line task tools.
#[derive(Parser)]
#[command(name = "stagesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the contents of a task file
    Inspect {
        /// Task file to read
        file: PathBuf,

        /// Print every row instead of row counts
        #[arg(short, long)]
        rows: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Build a task file from a JSON description
    Pack {
        /// JSON task description
        input: PathBuf,

        /// Task file to write
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Verify a task file against the tables its kind requires
    Verify {
        /// Task file to check
        file: PathBuf,

        /// Check as this task kind instead of the recorded one
        #[arg(short, long)]
        kind: Option<String>,

        /// Check as this object type instead of the recorded one
        #[arg(short, long)]
        object_type: Option<String>,
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

    match cli.command {
        Commands::Inspect { file, rows, format } => {
            commands::inspect::run(&file, rows, &format)?;
        }
        Commands::Pack { input, output } => {
            commands::pack::run(&input, &output)?;
        }
        Commands::Verify {
            file,
            kind,
            object_type,
        } => {
            let kind = kind.map(|k| k.parse::<TaskKind>()).transpose()?;
            commands::verify::run(&file, kind, object_type.as_deref())?;
        }
        Commands::Version => {
            println!("Stagesync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Stagesync Core v{}", stagesync_core::VERSION);
        }
    }

    Ok(())
}
