
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

const RUN_COLUMNS: &str = "id, root_path, started_at, finished_at, files_indexed, chunks_indexed, files_skipped, status, error_message";

pub struct IngestRunQueries;

impl IngestRunQueries {
    /// Record the start of a run and return it
    #[inline]
    pub async fn start(pool: &SqlitePool, root_path: &str) -> Result<IngestRun> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        sqlx::query(
            "INSERT INTO ingest_runs (id, root_path, started_at, status) VALUES (?, ?, ?, 'running')",
        )
        .bind(&id)
        .bind(root_path)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create ingest run")?;

        debug!("Started ingest run {} for {}", id, root_path);
        Self::get_by_id(pool, &id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created ingest run"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<IngestRun>> {
        let run = sqlx::query_as::<_, IngestRun>(&format!(
            "SELECT {RUN_COLUMNS} FROM ingest_runs WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get ingest run by id")?;

        Ok(run)
    }

    #[inline]
    pub async fn complete(pool: &SqlitePool, id: &str, totals: RunTotals) -> Result<()> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            "UPDATE ingest_runs SET status = 'completed', finished_at = ?, files_indexed = ?, chunks_indexed = ?, files_skipped = ? WHERE id = ?",
        )
        .bind(now)
        .bind(totals.files_indexed)
        .bind(totals.chunks_indexed)
        .bind(totals.files_skipped)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to complete ingest run")?;

        Ok(())
    }

    #[inline]
    pub async fn fail(pool: &SqlitePool, id: &str, error_message: &str) -> Result<()> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            "UPDATE ingest_runs SET status = 'failed', finished_at = ?, error_message = ? WHERE id = ?",
        )
        .bind(now)
        .bind(error_message)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to mark ingest run as failed")?;

        Ok(())
    }

    /// Most recent runs first
    #[inline]
    pub async fn list_recent(pool: &SqlitePool, limit: i64) -> Result<Vec<IngestRun>> {
        let runs = sqlx::query_as::<_, IngestRun>(&format!(
            "SELECT {RUN_COLUMNS} FROM ingest_runs ORDER BY started_at DESC, rowid DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list ingest runs")?;

        Ok(runs)
    }
}

pub struct IndexedFileQueries;

impl IndexedFileQueries {
    /// Insert or refresh the ledger row for a file
    #[inline]
    pub async fn upsert(pool: &SqlitePool, file: &NewIndexedFile) -> Result<()> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            r#"
            INSERT INTO indexed_files (filepath, filename, chunk_count, last_ingested_at, run_id)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(filepath) DO UPDATE SET
                filename = excluded.filename,
                chunk_count = excluded.chunk_count,
                last_ingested_at = excluded.last_ingested_at,
                run_id = excluded.run_id
            "#,
        )
        .bind(&file.filepath)
        .bind(&file.filename)
        .bind(file.chunk_count)
        .bind(now)
        .bind(&file.run_id)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to record indexed file {}", file.filepath))?;

        Ok(())
    }

    #[inline]
    pub async fn get_by_filepath(pool: &SqlitePool, filepath: &str) -> Result<Option<IndexedFile>> {
        let file = sqlx::query_as::<_, IndexedFile>(
            "SELECT filepath, filename, chunk_count, last_ingested_at, run_id FROM indexed_files WHERE filepath = ?",
        )
        .bind(filepath)
        .fetch_optional(pool)
        .await
        .context("Failed to get indexed file")?;

        Ok(file)
    }

    /// Largest chunk count recorded for any file with this name.
    ///
    /// Record ids only carry the file name, so this bounds the ids that may
    /// exist in the vector store for it.
    #[inline]
    pub async fn max_chunk_count_for_filename(pool: &SqlitePool, filename: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(chunk_count), 0) FROM indexed_files WHERE filename = ?",
        )
        .bind(filename)
        .fetch_one(pool)
        .await
        .context("Failed to read previous chunk count")?;

        Ok(count)
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<IndexedFile>> {
        let files = sqlx::query_as::<_, IndexedFile>(
            "SELECT filepath, filename, chunk_count, last_ingested_at, run_id FROM indexed_files ORDER BY filepath",
        )
        .fetch_all(pool)
        .await
        .context("Failed to list indexed files")?;

        Ok(files)
    }

    #[inline]
    pub async fn summary(pool: &SqlitePool) -> Result<LedgerSummary> {
        let summary = sqlx::query_as::<_, LedgerSummary>(
            "SELECT COUNT(*) AS file_count, COALESCE(SUM(chunk_count), 0) AS chunk_count FROM indexed_files",
        )
        .fetch_one(pool)
        .await
        .context("Failed to summarize indexed files")?;

        Ok(summary)
    }

    #[inline]
    pub async fn delete_all(pool: &SqlitePool) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM indexed_files")
            .execute(pool)
            .await
            .context("Failed to clear indexed files")?
            .rows_affected();

        debug!("Removed {} indexed file rows", deleted);
        Ok(deleted)
    }
}
