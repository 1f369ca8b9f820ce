use anyhow::{Context, Result};
use console::style;
use dialoguer::Confirm;
use std::path::Path;
use tracing::{info, warn};

use crate::RagError;
use crate::config::Config;
use crate::database::{Database, VectorIndex, VectorStore};
use crate::ingest::IngestReport;
use crate::ollama::OllamaClient;
use crate::pipeline::{Components, RagPipeline};

const RECENT_RUN_LIMIT: i64 = 5;

fn load_config(base_dir: &Path) -> Result<Config> {
    Config::load(base_dir).context("Failed to load configuration")
}

/// Index a directory tree into the vector store
#[inline]
pub async fn ingest_path(base_dir: &Path, path: &Path) -> Result<IngestReport> {
    let config = load_config(base_dir)?;
    let root = path
        .canonicalize()
        .with_context(|| format!("Cannot ingest {}", path.display()))?;

    info!("Ingesting {}", root.display());
    let components = Components::open(&config).await?;
    let report = components.ingestion(&config).ingest(&root).await?;

    println!("✅ Ingested {}", root.display());
    println!("   Files indexed: {}", report.files_indexed);
    println!("   Chunks stored: {}", report.chunks_indexed);
    if report.files_skipped > 0 {
        println!("   Files skipped: {}", report.files_skipped);
    }
    if report.id_collisions > 0 {
        println!(
            "   ⚠️  {} chunks shared an id with another file of the same name; the later file was kept",
            report.id_collisions
        );
    }
    if report.orphans_pruned > 0 {
        println!("   Stale chunks pruned: {}", report.orphans_pruned);
    }

    Ok(report)
}

/// Answer a question about the ingested code
#[inline]
pub async fn ask_question(
    base_dir: &Path,
    question: &str,
    top_k: Option<usize>,
    show_context: bool,
) -> Result<()> {
    let config = load_config(base_dir)?;
    let pipeline = RagPipeline::from_config(&config).await?;
    let top_k = top_k.unwrap_or_else(|| pipeline.top_k());

    let turn = match pipeline.ask_with_top_k(question, top_k).await {
        Ok(turn) => turn,
        Err(e @ RagError::StoreUnavailable(_)) => {
            eprintln!(
                "{} Run {} first.",
                style("Nothing has been ingested yet.").yellow(),
                style("code-doc-helper ingest <path>").cyan()
            );
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    if show_context && !turn.context.is_empty() {
        println!("{}", style("🔍 Retrieved context").bold().cyan());
        println!("{}", turn.context);
        println!();
    }

    println!("{}", turn.answer);
    if turn.retry_count > 0 {
        eprintln!(
            "{}",
            style(format!("(answered after {} retries)", turn.retry_count)).dim()
        );
    }

    Ok(())
}

/// Show store, ledger and model server health
#[inline]
pub async fn show_status(base_dir: &Path) -> Result<()> {
    let config = load_config(base_dir).unwrap_or_else(|e| {
        warn!("Using default configuration: {:#}", e);
        Config {
            base_dir: base_dir.to_path_buf(),
            ..Config::default()
        }
    });

    println!("📊 Code Doc Helper Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   📋 Embedding Model: {}", config.ollama.model);
            }
            Err(e) => println!("   ⚠️  Ollama: Unhealthy - {}", e),
        },
        Err(e) => println!("   ❌ Ollama: Failed to connect - {}", e),
    }
    println!(
        "   💬 Answers: {} ({})",
        config.generation.model, config.generation.provider
    );

    println!();
    println!("🔍 Vector Store Status:");
    match VectorStore::new(&config).await {
        Ok(store) => {
            let records = store.count().await?;
            println!(
                "   ✅ LanceDB: Connected (collection '{}')",
                store.table_name()
            );
            println!("   📊 Stored chunks: {}", records);
            if records > 0 && !store.validate_integrity().await? {
                println!("   ⚠️  Collection failed the integrity check; consider `clear` and re-ingest");
            }
        }
        Err(e) => println!("   ❌ LanceDB: Failed to open - {}", e),
    }

    println!();
    println!("🗄️  Ingestion Ledger:");
    let database = match Database::new(config.database_path()).await {
        Ok(database) => database,
        Err(e) => {
            println!("   ❌ SQLite: Failed to connect - {:#}", e);
            return Ok(());
        }
    };

    let summary = database.ledger_summary().await?;
    println!(
        "   📁 Files: {} ({} chunks)",
        summary.file_count, summary.chunk_count
    );

    let runs = database.recent_runs(RECENT_RUN_LIMIT).await?;
    if runs.is_empty() {
        println!("   No ingestion runs recorded yet.");
        return Ok(());
    }

    println!("   Recent runs:");
    for run in &runs {
        println!(
            "   • {} {} [{}] {} files, {} chunks, {} skipped",
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.root_path,
            run.status,
            run.files_indexed,
            run.chunks_indexed,
            run.files_skipped
        );
        if let Some(error) = &run.error_message {
            println!("     ⚠️  Error: {}", error);
        }
    }

    Ok(())
}

/// Drop every stored chunk and forget the indexed files
#[inline]
pub async fn clear_store(base_dir: &Path, assume_yes: bool) -> Result<()> {
    let config = load_config(base_dir)?;

    if !assume_yes
        && !Confirm::new()
            .with_prompt(format!(
                "Delete every chunk in collection '{}'?",
                config.store.collection
            ))
            .default(false)
            .interact()?
    {
        println!("Nothing deleted.");
        return Ok(());
    }

    let store = VectorStore::new(&config).await?;
    let removed = store.count().await?;
    store.clear().await?;

    let database = Database::new(config.database_path()).await?;
    let files = database.clear_files().await?;

    println!("✓ Removed {} chunks from '{}'", removed, store.table_name());
    println!("✓ Forgot {} indexed files", files);

    Ok(())
}
