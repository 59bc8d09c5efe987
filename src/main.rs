//! # askdoc CLI
//!
//! ```bash
//! askdoc --config ./config/askdoc.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `askdoc init` | Write a starter config and create the data directories |
//! | `askdoc serve` | Start the HTTP server |
//! | `askdoc ingest <file>` | Ingest a PDF from disk |
//! | `askdoc delete <filename>` | Remove a document and its chunks |
//! | `askdoc ask "<query>"` | Answer one question and print it |
//! | `askdoc stats` | Knowledge base and upload totals |
//!
//! Log verbosity follows `RUST_LOG` (default `askdoc=info,tower_http=info`).

use std::path::PathBuf;

use askdoc::{commands, config, server, stats};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// askdoc: answer questions from your uploaded documents.
#[derive(Parser)]
#[command(name = "askdoc", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/askdoc.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter config file and create the data directories.
    ///
    /// An existing config file is left untouched.
    Init,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Ingest a PDF file into the knowledge base.
    ///
    /// Re-ingesting a file with the same name replaces its chunks.
    Ingest {
        /// Path to the PDF.
        file: PathBuf,
    },

    /// Delete a document's chunks, upload record and stored file.
    Delete {
        /// Stored filename, as listed by `stats`.
        filename: String,
    },

    /// Answer a single question.
    Ask {
        query: String,

        /// Also print which answer path was taken.
        #[arg(long)]
        explain: bool,
    },

    /// Show knowledge base and upload totals.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("askdoc=info,tower_http=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        return commands::run_init(&cli.config);
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => unreachable!("handled before config loading"),
        Commands::Serve => server::run_server(&cfg).await?,
        Commands::Ingest { file } => commands::run_ingest(&cfg, &file).await?,
        Commands::Delete { filename } => commands::run_delete(&cfg, &filename).await?,
        Commands::Ask { query, explain } => commands::run_ask(&cfg, &query, explain).await?,
        Commands::Stats => stats::run_stats(&cfg).await?,
    }

    Ok(())
}
