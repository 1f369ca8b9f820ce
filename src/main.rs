use clap::{Parser, Subcommand};
use code_doc_helper::commands::{ask_question, clear_store, ingest_path, show_status};
use code_doc_helper::config::{resolve_base_dir, run_interactive_config, show_config};
use code_doc_helper::{RagError, Result};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "code-doc-helper")]
#[command(about = "Ask questions about a codebase using retrieval-augmented generation")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml, the vector store and the ledger
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the Ollama connection, models and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Chunk, embed and store every eligible file under a directory
    Ingest {
        /// Root of the codebase to index
        path: PathBuf,
    },
    /// Ask a question about the ingested code
    Ask {
        question: String,
        /// Number of chunks to retrieve
        #[arg(long)]
        top_k: Option<usize>,
        /// Print the retrieved context before the answer
        #[arg(long)]
        show_context: bool,
    },
    /// Show store contents, recent ingestion runs and model server health
    Status,
    /// Remove every stored chunk
    Clear {
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let base_dir = resolve_base_dir(cli.base_dir).map_err(|e| RagError::Config(e.to_string()))?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&base_dir)?;
            } else {
                run_interactive_config(&base_dir)?;
            }
        }
        Commands::Ingest { path } => {
            ingest_path(&base_dir, &path).await?;
        }
        Commands::Ask {
            question,
            top_k,
            show_context,
        } => {
            ask_question(&base_dir, &question, top_k, show_context).await?;
        }
        Commands::Status => {
            show_status(&base_dir).await?;
        }
        Commands::Clear { yes } => {
            clear_store(&base_dir, yes).await?;
        }
    }

    Ok(())
}
