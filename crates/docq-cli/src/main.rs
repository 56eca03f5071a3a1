//! docq CLI - ask a document database questions in plain English.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

mod commands;

/// docq - natural-language queries over document collections
#[derive(Parser)]
#[command(name = "docq")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Collection file or directory of .json/.jsonl collections
    #[arg(short, long, global = true, default_value = "data")]
    data: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one question
    Query {
        /// Collection to query
        collection: String,
        /// The question
        text: String,
        /// Continue an existing session
        #[arg(long)]
        session: Option<Uuid>,
    },

    /// Interactive multi-turn session
    Chat {
        /// Collection to query
        collection: String,
    },

    /// Show the inferred schema of a collection
    Schema {
        /// Collection to sample
        collection: String,
        /// Documents to sample
        #[arg(long, default_value_t = 100)]
        sample_size: usize,
        /// Also print this many sample documents
        #[arg(long, default_value_t = 0)]
        samples: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List collections and their sizes
    Collections,

    /// Show version and configuration
    Info,
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_env("DOCQ_LOG")
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| miette::miette!("Failed to start async runtime: {}", e))?;

    runtime.block_on(async {
        match cli.command {
            Commands::Query {
                collection,
                text,
                session,
            } => commands::query::run(&cli.data, &collection, &text, session).await,
            Commands::Chat { collection } => commands::chat::run(&cli.data, &collection).await,
            Commands::Schema {
                collection,
                sample_size,
                samples,
                json,
            } => commands::schema::run(&cli.data, &collection, sample_size, samples, json).await,
            Commands::Collections => commands::collections::run(&cli.data).await,
            Commands::Info => commands::info::run(&cli.data).await,
        }
    })
}
