//! deltaflow CLI
//!
//! Command-line front end for tracking collections and mirroring their
//! changes into a sink.
//!
//! # Commands
//!
//! - `track` - Follow a collection's changes forever
//! - `iterate` - Read a collection once
//! - `probe` - Print the server version and check it supports tracking
//! - `sink` - Run a sink that prints every streamed POST body

mod commands;

use clap::{Parser, Subcommand};
use commands::{IterateArgs, ProbeArgs, SinkArgs, TrackArgs};
use tracing_subscriber::EnvFilter;

/// Mirrors change-tracked OData collections into an HTTP sink.
#[derive(Parser)]
#[command(name = "deltaflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long, env = "DELTAFLOW_VERBOSE")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track a collection, polling its delta link forever
    Track(TrackArgs),

    /// Read a collection once, following next links only
    Iterate(IterateArgs),

    /// Print the server version and check it supports change tracking
    Probe(ProbeArgs),

    /// Run a sink that prints every streamed POST body
    Sink(SinkArgs),

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Track(args) => commands::track::run(&args, cli.verbose)?,
        Commands::Iterate(args) => commands::iterate::run(&args, cli.verbose)?,
        Commands::Probe(args) => commands::probe::run(&args)?,
        Commands::Sink(args) => commands::sink::run(&args)?,
        Commands::Version => {
            println!("deltaflow CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
