//! # Rental RAG CLI (`rag`)
//!
//! The `rag` binary builds the answer index from scraped website pages,
//! answers questions from the terminal, and runs the HTTP chat server.
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag init` | Create the SQLite index and its schema |
//! | `rag ingest` | Load the scraped corpus and refresh the index |
//! | `rag ask "<question>"` | Answer a question, optionally streamed |
//! | `rag search "<query>"` | Show the ranked chunks retrieval returns |
//! | `rag stats` | Index statistics |
//! | `rag clear` | Remove every indexed entry |
//! | `rag serve` | Start the HTTP chat server |
//! | `rag completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! rag init
//! rag ingest --path ./data/pages
//! rag ask "Do you rent cinema cameras?" --stream
//! rag serve
//! ```
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rental_rag::{ask, config, engine, ingest, migrate, search, server, stats};

/// Rental RAG: grounded customer-service answers for a rental business.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rag",
    about = "Grounded customer-service answers for a rental business",
    version,
    long_about = "Rental RAG chunks and embeds the business's scraped website pages, \
    retrieves the passages relevant to a customer question, and asks a language model \
    to answer from those passages only, citing their URLs."
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the SQLite index and run schema migrations.
    Init,

    /// Load scraped pages and (re)index them.
    Ingest {
        /// Corpus directory, overriding `[corpus].root`.
        #[arg(long)]
        path: Option<PathBuf>,

        /// Report what would be ingested without touching the index.
        #[arg(long)]
        dry_run: bool,
    },

    /// Answer a question from the indexed pages.
    Ask {
        question: String,

        /// Number of chunks to retrieve (defaults to `[retrieval].top_k`).
        #[arg(long)]
        k: Option<usize>,

        /// Print fragments as they are generated.
        #[arg(long)]
        stream: bool,
    },

    /// Retrieve and print the chunks that best match a query.
    Search {
        query: String,

        #[arg(long)]
        k: Option<usize>,
    },

    /// Show index statistics.
    Stats,

    /// Remove every entry from the index.
    Clear,

    /// Start the HTTP chat server on `[server].bind`.
    Serve,

    /// Print a shell completion script to stdout.
    Completions {
        shell: Shell,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "rag", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Index initialized at {}", cfg.index.path.display());
        }
        Commands::Ingest { path, dry_run } => {
            ingest::run_ingest(&cfg, path.as_deref(), dry_run).await?;
        }
        Commands::Ask {
            question,
            k,
            stream,
        } => {
            ask::run_ask(&cfg, &question, k, stream).await?;
        }
        Commands::Search { query, k } => {
            search::run_search(&cfg, &query, k).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Clear => {
            let engine = engine::open_engine(&cfg).await?;
            engine.clear().await?;
            println!("Index cleared.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
