use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::models::{
    IndexedFile, IngestRun, LedgerSummary, NewIndexedFile, RunTotals,
};
use crate::database::sqlite::queries::{IndexedFileQueries, IngestRunQueries};


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

/// SQLite ledger of ingestion runs and indexed files
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    pub async fn new<P: AsRef<Path>>(database_url: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_url)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config_dir.join("metadata.db")).await
    }

    // Run operations
    pub async fn start_run(&self, root_path: &str) -> Result<IngestRun> {
        IngestRunQueries::start(&self.pool, root_path).await
    }

    pub async fn complete_run(&self, id: &str, totals: RunTotals) -> Result<()> {
        IngestRunQueries::complete(&self.pool, id, totals).await
    }

    pub async fn fail_run(&self, id: &str, error_message: &str) -> Result<()> {
        IngestRunQueries::fail(&self.pool, id, error_message).await
    }

    pub async fn recent_runs(&self, limit: i64) -> Result<Vec<IngestRun>> {
        IngestRunQueries::list_recent(&self.pool, limit).await
    }

    // Indexed file operations
    pub async fn record_file(&self, file: &NewIndexedFile) -> Result<()> {
        IndexedFileQueries::upsert(&self.pool, file).await
    }

    pub async fn previous_chunk_count(&self, filename: &str) -> Result<i64> {
        IndexedFileQueries::max_chunk_count_for_filename(&self.pool, filename).await
    }

    pub async fn indexed_files(&self) -> Result<Vec<IndexedFile>> {
        IndexedFileQueries::list_all(&self.pool).await
    }

    pub async fn ledger_summary(&self) -> Result<LedgerSummary> {
        IndexedFileQueries::summary(&self.pool).await
    }

    /// Forget every indexed file; run history is kept
    pub async fn clear_files(&self) -> Result<u64> {
        IndexedFileQueries::delete_all(&self.pool).await
    }
}
