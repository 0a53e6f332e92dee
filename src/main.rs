//! # Docent CLI (`docent`)
//!
//! ## Usage
//!
//! ```bash
//! docent --config ./config/docent.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docent serve` | Start the HTTP API |
//! | `docent ingest [--force-reindex]` | Ingest every PDF in storage |
//! | `docent ask "<question>" [--top-k N]` | Answer one question from the index |
//! | `docent index create\|delete\|clear` | Manage the search index |
//! | `docent config` | Print the effective configuration summary |
//!
//! With `[search] backend = "memory"` the index lives inside the process, so
//! `ingest` and `ask` only share state when run through `serve`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use docent::app::AppContext;
use docent::config::load_config;
use docent::{logging, server};
use docent_core::pipeline::AnswerRequest;

/// Docent: grounded question answering over a PDF corpus, with page-level citations.
#[derive(Parser)]
#[command(name = "docent", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docent.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Extract, chunk, embed and index every document in storage.
    Ingest {
        /// Delete the search index before ingesting.
        #[arg(long)]
        force_reindex: bool,
    },

    /// Answer a single question and print it with citations.
    Ask {
        question: String,

        /// Number of chunks to retrieve (1-20).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Manage the search index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Print the secret-free configuration summary as JSON.
    Config,
}

#[derive(Subcommand)]
enum IndexAction {
    /// Create the index, or update its schema.
    Create,
    /// Delete the index.
    Delete,
    /// Remove every record while keeping the index.
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;
    logging::init(&cfg.logging.level);

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&cfg.summary())?);
        }
        Commands::Serve => {
            let ctx = Arc::new(AppContext::from_config(&cfg)?);
            server::run_server(ctx).await?;
        }
        Commands::Ingest { force_reindex } => {
            if cfg.search.backend == "memory" {
                tracing::warn!("memory search backend: indexed chunks are discarded on exit");
            }
            let ctx = AppContext::from_config(&cfg)?;
            let report = ctx.ingest.run(force_reindex).await?;
            for line in &report.details {
                println!("  {}", line);
            }
            println!("{}", report.message);
            println!(
                "documents: {}  chunks: {}  failures: {}",
                report.documents_processed, report.chunks_indexed, report.failures
            );
            if !report.success {
                std::process::exit(1);
            }
        }
        Commands::Ask { question, top_k } => {
            let ctx = AppContext::from_config(&cfg)?;
            let mut req = AnswerRequest::new(question);
            req.top_k = top_k;
            let response = ctx.pipeline.answer(&req).await?;
            println!("{}", response.answer);
            if !response.citations.is_empty() {
                println!();
                for (i, c) in response.citations.iter().enumerate() {
                    let page = c
                        .page_number
                        .map(|p| format!(", page {}", p))
                        .unwrap_or_default();
                    println!("[{}] {}{}", i + 1, c.source_document, page);
                    println!("    {}", c.source_url);
                }
            }
        }
        Commands::Index { action } => {
            let ctx = AppContext::from_config(&cfg)?;
            match action {
                IndexAction::Create => {
                    ctx.search.ensure_index().await?;
                    println!("Index '{}' created or updated.", ctx.search.index_name());
                }
                IndexAction::Delete => {
                    ctx.search.delete_index().await?;
                    println!("Index '{}' deleted.", ctx.search.index_name());
                }
                IndexAction::Clear => {
                    let removed = ctx.search.clear_documents().await?;
                    println!(
                        "Removed {} records from index '{}'.",
                        removed,
                        ctx.search.index_name()
                    );
                }
            }
        }
    }

    Ok(())
}
