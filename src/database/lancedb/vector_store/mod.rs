
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use itertools::Itertools;
use lancedb::{
    Connection, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::database::{ChunkMetadata, IndexedRecord, SearchResult, VectorIndex};
use crate::{RagError, Result};

/// Ids per `IN (...)` predicate when deleting
const DELETE_BATCH_SIZE: usize = 500;

/// Vector database store using LanceDB for similarity search
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    vector_dimension: usize,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("table_name", &self.table_name)
            .field("vector_dimension", &self.vector_dimension)
            .finish_non_exhaustive()
    }
}

impl VectorStore {
    /// Open the store described by `config`: `<base_dir>/vectors`, table
    /// `store.collection`, dimension `ollama.embedding_dimension`.
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        Self::open(
            &config.vector_database_path(),
            &config.store.collection,
            config.ollama.embedding_dimension as usize,
        )
        .await
    }

    /// Connect to the LanceDB directory at `db_path`.
    ///
    /// The table itself is created lazily by the first upsert.
    #[inline]
    pub async fn open(db_path: &Path, table_name: &str, vector_dimension: usize) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path).map_err(|e| {
            RagError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = db_path.display().to_string();

        // Attempt to connect with corruption recovery
        let connection = match lancedb::connect(&uri).execute().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to connect to LanceDB: {}", e);

                let error_msg = e.to_string().to_lowercase();
                if error_msg.contains("corrupt")
                    || error_msg.contains("invalid")
                    || error_msg.contains("malformed")
                {
                    warn!("Database corruption detected, attempting recovery");
                    Self::attempt_corruption_recovery(db_path)?;

                    lancedb::connect(&uri).execute().await.map_err(|e| {
                        RagError::Database(format!(
                            "Failed to connect to LanceDB after recovery: {}",
                            e
                        ))
                    })?
                } else {
                    return Err(RagError::Database(format!(
                        "Failed to connect to LanceDB: {}",
                        e
                    )));
                }
            }
        };

        info!("Vector store opened (collection '{}')", table_name);
        Ok(Self {
            connection,
            table_name: table_name.to_string(),
            vector_dimension,
        })
    }

    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    #[inline]
    pub fn vector_dimension(&self) -> usize {
        self.vector_dimension
    }

    async fn table_exists(&self) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))?;
        Ok(table_names.contains(&self.table_name))
    }

    async fn open_existing_table(&self) -> Result<Option<Table>> {
        if !self.table_exists().await? {
            return Ok(None);
        }

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {}", e)))?;
        Ok(Some(table))
    }

    /// Open the table, creating it on first use, and confirm its vector
    /// column matches the configured dimension.
    async fn ensure_table(&self) -> Result<Table> {
        if let Some(table) = self.open_existing_table().await? {
            let existing = Self::detect_vector_dimension(&table).await?;
            if existing != self.vector_dimension {
                return Err(RagError::Database(format!(
                    "Collection '{}' stores {}-dimensional vectors but {} are configured; run `clear` and re-ingest",
                    self.table_name, existing, self.vector_dimension
                )));
            }
            return Ok(table);
        }

        info!(
            "Creating collection '{}' with {} dimensions",
            self.table_name, self.vector_dimension
        );
        self.connection
            .create_empty_table(&self.table_name, self.create_schema())
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to create table: {}", e)))
    }

    /// Detect vector dimension from existing table schema
    async fn detect_vector_dimension(table: &Table) -> Result<usize> {
        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::Database(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(RagError::Database(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    fn create_schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.vector_dimension as i32,
                ),
                false,
            ),
            Field::new("document", DataType::Utf8, false),
            Field::new("filename", DataType::Utf8, false),
            Field::new("filepath", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt64, false),
            Field::new("language", DataType::Utf8, false),
            Field::new("start_line", DataType::UInt64, false),
            Field::new("end_line", DataType::UInt64, false),
        ]))
    }

    /// Create a RecordBatch from indexed records
    fn create_record_batch(&self, records: &[IndexedRecord]) -> Result<RecordBatch> {
        let vector_dim = self.vector_dimension;

        let mut flat_values = Vec::with_capacity(records.len() * vector_dim);
        for record in records {
            if record.embedding.len() != vector_dim {
                return Err(RagError::Database(format!(
                    "Record {} has {} dimensions, store expects {}",
                    record.id,
                    record.embedding.len(),
                    vector_dim
                )));
            }
            flat_values.extend_from_slice(&record.embedding);
        }

        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array = FixedSizeListArray::try_new(
            field,
            vector_dim as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| RagError::Database(format!("Failed to create vector array: {}", e)))?;

        let strings = |f: fn(&IndexedRecord) -> &str| -> Arc<dyn Array> {
            Arc::new(StringArray::from(records.iter().map(f).collect::<Vec<_>>()))
        };
        let numbers = |f: fn(&IndexedRecord) -> u64| -> Arc<dyn Array> {
            Arc::new(UInt64Array::from(records.iter().map(f).collect::<Vec<_>>()))
        };

        let arrays: Vec<Arc<dyn Array>> = vec![
            strings(|r| r.id.as_str()),
            Arc::new(vector_array),
            strings(|r| r.document.as_str()),
            strings(|r| r.metadata.filename.as_str()),
            strings(|r| r.metadata.filepath.as_str()),
            numbers(|r| r.metadata.chunk_index),
            strings(|r| r.metadata.language.as_str()),
            numbers(|r| r.metadata.start_line),
            numbers(|r| r.metadata.end_line),
        ];

        RecordBatch::try_new(self.create_schema(), arrays)
            .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Parse search results from LanceDB stream into SearchResult structs
    async fn parse_search_results_stream(
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<SearchResult>> {
        let mut search_results = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
        {
            search_results.extend(Self::parse_search_batch(&batch)?);
        }

        debug!("Parsed {} search results from stream", search_results.len());
        Ok(search_results)
    }

    fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
        batch
            .column_by_name(name)
            .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
    }

    fn u64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt64Array> {
        batch
            .column_by_name(name)
            .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
            .as_any()
            .downcast_ref::<UInt64Array>()
            .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
    }

    /// Parse a single record batch from search results
    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
        let ids = Self::string_column(batch, "id")?;
        let documents = Self::string_column(batch, "document")?;
        let filenames = Self::string_column(batch, "filename")?;
        let filepaths = Self::string_column(batch, "filepath")?;
        let languages = Self::string_column(batch, "language")?;
        let chunk_indices = Self::u64_column(batch, "chunk_index")?;
        let start_lines = Self::u64_column(batch, "start_line")?;
        let end_lines = Self::u64_column(batch, "end_line")?;

        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let results = (0..batch.num_rows())
            .map(|row| SearchResult {
                id: ids.value(row).to_string(),
                document: documents.value(row).to_string(),
                metadata: ChunkMetadata {
                    filename: filenames.value(row).to_string(),
                    filepath: filepaths.value(row).to_string(),
                    chunk_index: chunk_indices.value(row),
                    language: languages.value(row).to_string(),
                    start_line: start_lines.value(row),
                    end_line: end_lines.value(row),
                },
                distance: distances
                    .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) }),
            })
            .collect();

        Ok(results)
    }

    async fn delete_from(table: &Table, ids: &[String]) -> Result<()> {
        for batch in ids.chunks(DELETE_BATCH_SIZE) {
            let predicate = format!(
                "id IN ({})",
                batch
                    .iter()
                    .map(|id| format!("'{}'", id.replace('\'', "''")))
                    .join(", ")
            );
            table
                .delete(&predicate)
                .await
                .map_err(|e| RagError::Database(format!("Failed to delete records: {}", e)))?;
        }
        Ok(())
    }

    /// Attempt to recover from database corruption
    fn attempt_corruption_recovery(db_path: &Path) -> Result<()> {
        warn!("Attempting database corruption recovery at {:?}", db_path);

        if db_path.exists() {
            let backup_path = db_path.with_extension("corrupted_backup");
            if let Err(e) = std::fs::rename(db_path, &backup_path) {
                error!("Failed to backup corrupted database: {}", e);
            } else {
                info!("Corrupted database backed up to {:?}", backup_path);
            }
        }

        if db_path.exists() {
            std::fs::remove_dir_all(db_path).map_err(|e| {
                RagError::Database(format!("Failed to remove corrupted database: {}", e))
            })?;
        }

        info!("Database corruption recovery completed");
        Ok(())
    }

    /// Check that the collection can be opened and counted.
    ///
    /// A missing collection is reported as unhealthy.
    #[inline]
    pub async fn validate_integrity(&self) -> Result<bool> {
        debug!("Validating database integrity");

        let table = match self.open_existing_table().await {
            Ok(Some(table)) => table,
            Ok(None) => {
                warn!("Collection '{}' missing during integrity check", self.table_name);
                return Ok(false);
            }
            Err(e) => {
                error!("Failed to open table during integrity check: {}", e);
                return Ok(false);
            }
        };

        match table.count_rows(None).await {
            Ok(count) => {
                debug!("Database integrity check passed, {} rows found", count);
                Ok(true)
            }
            Err(e) => {
                error!("Failed to count rows during integrity check: {}", e);
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl VectorIndex for VectorStore {
    async fn upsert(&self, records: Vec<IndexedRecord>) -> Result<()> {
        if records.is_empty() {
            debug!("No records to store");
            return Ok(());
        }

        // Later records win when an id repeats within one call
        let mut records: Vec<IndexedRecord> = records
            .into_iter()
            .rev()
            .unique_by(|record| record.id.clone())
            .collect();
        records.reverse();

        let record_batch = self.create_record_batch(&records)?;
        let table = self.ensure_table().await?;

        // One commit: existing ids are replaced, new ids are inserted
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        let mut merge = table.merge_insert(&["id"]);
        merge.when_matched_update_all(None).when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| RagError::Database(format!("Failed to upsert records: {}", e)))?;

        info!("Upserted {} records into '{}'", records.len(), self.table_name);
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        debug!("Searching for similar vectors with limit: {}", k);

        let table = self.open_existing_table().await?.ok_or_else(|| {
            RagError::StoreUnavailable(format!("collection '{}' does not exist", self.table_name))
        })?;

        if k == 0 {
            return Ok(Vec::new());
        }
        if embedding.len() != self.vector_dimension {
            return Err(RagError::Database(format!(
                "Query has {} dimensions, store expects {}",
                embedding.len(),
                self.vector_dimension
            )));
        }

        let results = table
            .vector_search(embedding)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .limit(k)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?;

        let mut hits = Self::parse_search_results_stream(results).await?;
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        let Some(table) = self.open_existing_table().await? else {
            return Ok(0);
        };

        table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))
    }

    async fn delete_ids(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        if let Some(table) = self.open_existing_table().await? {
            debug!("Deleting {} records", ids.len());
            Self::delete_from(&table, ids).await?;
        }
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        let Some(table) = self.open_existing_table().await? else {
            return Ok(Vec::new());
        };

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut stream = table
            .query()
            .limit(count)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to scan table: {}", e)))?;

        let mut ids = Vec::with_capacity(count);
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
        {
            let column = Self::string_column(&batch, "id")?;
            ids.extend((0..batch.num_rows()).map(|row| column.value(row).to_string()));
        }
        ids.sort();
        Ok(ids)
    }

    async fn clear(&self) -> Result<()> {
        if self.table_exists().await? {
            info!("Dropping collection '{}'", self.table_name);
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| RagError::Database(format!("Failed to drop table: {}", e)))?;
        }
        Ok(())
    }
}
