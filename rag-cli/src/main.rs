//! `rag-diary`: a command-line front end for the RAG diary engine.
//!
//! Loads an `EngineConfig` plus CLI-only settings from `--config` (or the
//! platform default), then dispatches to one of the top-level subcommands.

mod commands;
mod config;
mod errors;
mod output;

use crate::config::ResolvedConfig;
use crate::output::OutputFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rag-diary", version, about = "RAG diary engine command-line interface")]
struct Cli {
    /// Path to a TOML config file. Defaults to the platform config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Human, global = true)]
    format: OutputFormat,

    /// Emit debug-level tracing to stderr.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk a diary root and feed every file into the tag subsystem.
    Ingest {
        /// Root directory containing one subdirectory per diary.
        root: PathBuf,
    },
    /// Inspect the global tag vocabulary.
    #[command(subcommand)]
    Tag(TagCommands),
    /// Run a chat message through the query planner against persisted diaries.
    Ask {
        /// The message to resolve placeholders for.
        message: String,
    },
    /// Inspect or validate the resolved configuration.
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum TagCommands {
    /// Expand a seed tag set via the cooccurrence graph.
    Expand {
        /// One or more seed tags.
        seeds: Vec<String>,
    },
    /// Report the cooccurrence graph's size.
    Stats,
    /// Find tags similar to a query string.
    Similar {
        /// Text to embed and search against the tag vector index.
        query: String,
        /// Number of neighbors to return.
        #[arg(long, default_value_t = 10)]
        k: usize,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Validate that mandatory config fields are set.
    Validate,
    /// Print the resolved configuration (secrets redacted).
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let resolved = ResolvedConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest { root } => commands::ingest::run(&root, &resolved, cli.format).await,
        Commands::Tag(TagCommands::Expand { seeds }) => {
            commands::tag::expand(seeds, &resolved, cli.format).await
        }
        Commands::Tag(TagCommands::Stats) => commands::tag::stats(&resolved, cli.format).await,
        Commands::Tag(TagCommands::Similar { query, k }) => {
            commands::tag::similar(query, k, &resolved, cli.format).await
        }
        Commands::Ask { message } => commands::ask::run(message, &resolved, cli.format).await,
        Commands::Config(ConfigCommands::Validate) => {
            commands::config_cmd::validate(&resolved, cli.format)
        }
        Commands::Config(ConfigCommands::Show) => commands::config_cmd::show(&resolved, cli.format),
    }
}
