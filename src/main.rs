mod cli;
mod config;
mod db;
mod embedding;
mod error;
mod identity;
mod import;
mod jsonc;
mod memory;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "memo", version, about = "Per-project persistent memory for LLM agents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store one memory in the project (or a named container)
    Add {
        /// The memory text
        text: String,
        /// Named container instead of the project scope
        #[arg(long)]
        container: Option<String>,
    },
    /// Import markdown documents or a repo map
    Import {
        /// Markdown file or directory to import
        #[arg(long, value_name = "PATH", conflicts_with = "repo_map")]
        markdown: Option<PathBuf>,
        /// Repo-map JSON file to import
        #[arg(long, value_name = "FILE")]
        repo_map: Option<PathBuf>,
        /// Named container instead of the project scope
        #[arg(long)]
        container: Option<String>,
        /// Chunk window in tokens (markdown only)
        #[arg(long, default_value_t = 400)]
        chunk_tokens: usize,
        /// Chunk overlap in tokens (markdown only)
        #[arg(long, default_value_t = 80)]
        overlap_tokens: usize,
    },
    /// Hybrid vector + keyword search
    Search {
        /// The query text
        query: String,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
        /// Minimum reported similarity
        #[arg(long)]
        threshold: Option<f64>,
        /// Named container instead of the project scope
        #[arg(long)]
        container: Option<String>,
        /// Skip the vector subsystem
        #[arg(long)]
        skip_vector: bool,
        /// Skip the keyword subsystem
        #[arg(long)]
        skip_full_text: bool,
    },
    /// Show recent memories, newest first
    List {
        /// Maximum number of records
        #[arg(long)]
        limit: Option<usize>,
        /// Show everything
        #[arg(long)]
        all: bool,
        /// Named container instead of the project scope
        #[arg(long)]
        container: Option<String>,
    },
    /// Delete a memory by id
    Forget {
        /// The record id (mem_...)
        id: String,
        /// Refuse unless the record belongs to this named container
        #[arg(long)]
        container: Option<String>,
    },
    /// Delete the project database
    Reset,
    /// Repair the full-text index
    Reindex,
    /// Summarise model, store, and thresholds
    Status,
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the model artifacts from Hugging Face
    Download,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Log to stderr so stdout stays clean for command output.
    let filter = EnvFilter::try_from_env("MEMO_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => {}
        Err(err) => {
            if error::exit_code_for(&err) != 2 {
                tracing::error!(error = ?err, "operation failed");
            }
            eprintln!("error: {err:#}");
            std::process::exit(error::exit_code_for(&err));
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::MemoConfig::load()?;

    match cli.command {
        Command::Add { text, container } => {
            cli::add::add(&config, &text, container.as_deref()).await
        }
        Command::Import {
            markdown,
            repo_map,
            container,
            chunk_tokens,
            overlap_tokens,
        } => match (markdown, repo_map) {
            (Some(path), None) => {
                cli::import::markdown(
                    &config,
                    &path,
                    container.as_deref(),
                    chunk_tokens,
                    overlap_tokens,
                )
                .await
            }
            (None, Some(path)) => {
                cli::import::repo_map(&config, &path, container.as_deref()).await
            }
            _ => Err(error::MemoError::InvalidInput(
                "import needs exactly one of --markdown or --repo-map".into(),
            )
            .into()),
        },
        Command::Search {
            query,
            limit,
            threshold,
            container,
            skip_vector,
            skip_full_text,
        } => {
            cli::search::search(
                &config,
                &query,
                limit,
                threshold,
                container.as_deref(),
                skip_vector,
                skip_full_text,
            )
            .await
        }
        Command::List {
            limit,
            all,
            container,
        } => cli::list::list(&config, limit, all, container.as_deref()),
        Command::Forget { id, container } => {
            cli::forget::forget(&config, &id, container.as_deref())
        }
        Command::Reset => cli::reset::reset(),
        Command::Reindex => cli::reindex::reindex(&config),
        Command::Status => cli::status::status(&config),
        Command::Model { action } => match action {
            ModelAction::Download => cli::model_download(&config).await,
        },
    }
}
