// Ingestion pipeline: file tree -> chunks -> embeddings -> vector store

pub mod walker;


pub use walker::{FileFilter, collect_files};

use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::IngestConfig;
use crate::database::sqlite::models::{NewIndexedFile, RunTotals};
use crate::database::{ChunkMetadata, Database, IndexedRecord, VectorIndex};
use crate::embeddings::{EmbeddingGateway, chunk_text};
use crate::{RagError, Result};

const DEFAULT_EMBED_BATCH_SIZE: usize = 16;

/// Counters for one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub files_indexed: usize,
    /// Distinct record ids written
    pub chunks_indexed: usize,
    /// Unreadable, binary or blank files
    pub files_skipped: usize,
    /// Ids produced by more than one file; the later file won
    pub id_collisions: usize,
    pub orphans_pruned: usize,
    pub run_id: Option<String>,
}

/// Language tag for a file name: the text after the last `.`, or `txt`
#[inline]
pub fn language_for(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map_or_else(|| "txt".to_string(), |(_, ext)| ext.to_string())
}

/// Decode file bytes as text.
///
/// Invalid UTF-8 sequences are dropped. Content with NUL bytes is treated
/// as binary and rejected.
#[inline]
pub fn decode_text(bytes: &[u8], path: &Path) -> Result<String> {
    if bytes.contains(&0) {
        return Err(RagError::Decode(format!(
            "{} looks like a binary file",
            path.display()
        )));
    }

    let mut text = String::with_capacity(bytes.len());
    let mut dropped = false;
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
        dropped |= !chunk.invalid().is_empty();
    }
    if dropped {
        debug!("Dropped invalid UTF-8 from {}", path.display());
    }
    Ok(text)
}

/// A chunk waiting for its embedding
struct PendingRecord {
    id: String,
    document: String,
    metadata: ChunkMetadata,
    source: PathBuf,
}

/// Walks a tree and upserts one record per chunk.
///
/// The run is sequential: every file is chunked, all chunks are embedded in
/// batches and the records are written with a single upsert. Files that
/// cannot be decoded are skipped; embedding or store failures abort the run
/// and leave whatever was stored before untouched.
pub struct IngestionPipeline {
    gateway: EmbeddingGateway,
    store: Arc<dyn VectorIndex>,
    ledger: Option<Database>,
    filter: FileFilter,
    chunk_size: usize,
    batch_size: usize,
    prune_orphans: bool,
}

impl IngestionPipeline {
    #[inline]
    pub fn new(
        gateway: EmbeddingGateway,
        store: Arc<dyn VectorIndex>,
        config: &IngestConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            ledger: None,
            filter: FileFilter::from_config(config),
            chunk_size: config.chunk_size,
            batch_size: DEFAULT_EMBED_BATCH_SIZE,
            prune_orphans: config.prune_orphans,
        }
    }

    #[inline]
    pub fn with_ledger(mut self, ledger: Database) -> Self {
        self.ledger = Some(ledger);
        self
    }

    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[inline]
    pub async fn ingest(&self, root: &Path) -> Result<IngestReport> {
        if !root.exists() {
            return Err(RagError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", root.display()),
            )));
        }

        let run_id = match &self.ledger {
            Some(ledger) => Some(
                ledger
                    .start_run(&root.display().to_string())
                    .await
                    .map_err(ledger_error)?
                    .id,
            ),
            None => None,
        };

        let result = self.run(root, run_id.as_deref()).await;

        if let (Some(ledger), Some(id)) = (&self.ledger, &run_id) {
            match &result {
                Ok(report) => {
                    let totals = RunTotals {
                        files_indexed: report.files_indexed as i64,
                        chunks_indexed: report.chunks_indexed as i64,
                        files_skipped: report.files_skipped as i64,
                    };
                    ledger.complete_run(id, totals).await.map_err(ledger_error)?;
                }
                Err(e) => {
                    if let Err(ledger_err) = ledger.fail_run(id, &e.to_string()).await {
                        warn!("Could not record failed run: {:#}", ledger_err);
                    }
                }
            }
        }

        result.map(|report| IngestReport { run_id, ..report })
    }

    async fn run(&self, root: &Path, run_id: Option<&str>) -> Result<IngestReport> {
        info!("Ingesting files under {}", root.display());
        let files = collect_files(root, &self.filter);

        let mut report = IngestReport::default();
        let mut pending: Vec<PendingRecord> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        // chunk counts per file, and the largest per file name; blank files
        // count as zero only when pruning
        let mut file_counts: Vec<(PathBuf, String, usize)> = Vec::new();
        let mut name_counts: HashMap<String, usize> = HashMap::new();

        for path in &files {
            let Some(text) = read_text(path) else {
                report.files_skipped += 1;
                continue;
            };

            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let chunks = chunk_text(&text, self.chunk_size, &filename, path);
            if chunks.is_empty() {
                debug!("Skipping blank file {}", path.display());
                report.files_skipped += 1;
                if self.prune_orphans {
                    // a file that went blank drops all of its earlier records
                    name_counts.entry(filename.clone()).or_default();
                    file_counts.push((path.clone(), filename, 0));
                }
                continue;
            }

            let language = language_for(&filename);
            let filepath = path.display().to_string();
            for (index, chunk) in chunks.iter().enumerate() {
                let record = PendingRecord {
                    id: IndexedRecord::record_id(&filename, index),
                    document: chunk.text.clone(),
                    metadata: ChunkMetadata {
                        filename: filename.clone(),
                        filepath: filepath.clone(),
                        chunk_index: index as u64,
                        language: language.clone(),
                        start_line: chunk.start_line as u64,
                        end_line: chunk.end_line as u64,
                    },
                    source: path.clone(),
                };

                if let Some(&position) = positions.get(&record.id) {
                    warn!(
                        "Record {} from {} replaces the one from {}",
                        record.id,
                        path.display(),
                        pending[position].source.display()
                    );
                    report.id_collisions += 1;
                    pending[position] = record;
                } else {
                    positions.insert(record.id.clone(), pending.len());
                    pending.push(record);
                }
            }

            let entry = name_counts.entry(filename.clone()).or_default();
            *entry = (*entry).max(chunks.len());
            file_counts.push((path.clone(), filename, chunks.len()));
            report.files_indexed += 1;
        }

        if pending.is_empty() && name_counts.is_empty() {
            info!("No eligible files found under {}", root.display());
            return Ok(report);
        }

        let orphans = self.find_orphans(&name_counts).await?;

        if !pending.is_empty() {
            let records = self.embed_pending(pending)?;
            report.chunks_indexed = records.len();
            self.store.upsert(records).await?;
        }

        if !orphans.is_empty() {
            info!("Pruning {} orphaned records", orphans.len());
            self.store.delete_ids(&orphans).await?;
            report.orphans_pruned = orphans.len();
        }

        if let (Some(ledger), Some(run_id)) = (&self.ledger, run_id) {
            for (path, filename, chunk_count) in file_counts {
                ledger
                    .record_file(&NewIndexedFile {
                        filepath: path.display().to_string(),
                        filename,
                        chunk_count: chunk_count as i64,
                        run_id: run_id.to_string(),
                    })
                    .await
                    .map_err(ledger_error)?;
            }
        }

        info!(
            "Indexed {} chunks from {} files ({} skipped)",
            report.chunks_indexed, report.files_indexed, report.files_skipped
        );
        Ok(report)
    }

    /// Ids left behind by files that now produce fewer chunks
    async fn find_orphans(&self, name_counts: &HashMap<String, usize>) -> Result<Vec<String>> {
        let Some(ledger) = self.ledger.as_ref().filter(|_| self.prune_orphans) else {
            return Ok(Vec::new());
        };

        let mut orphans = Vec::new();
        for (filename, &new_count) in name_counts {
            let previous = ledger
                .previous_chunk_count(filename)
                .await
                .map_err(ledger_error)?;
            let previous = usize::try_from(previous).unwrap_or(0);
            orphans.extend(
                (new_count..previous).map(|index| IndexedRecord::record_id(filename, index)),
            );
        }
        orphans.sort();
        Ok(orphans)
    }

    fn embed_pending(&self, pending: Vec<PendingRecord>) -> Result<Vec<IndexedRecord>> {
        let bar = if console::user_attended_stderr() {
            ProgressBar::new(pending.len() as u64).with_style(
                ProgressStyle::with_template("{bar:40} [{pos}/{len}] Embedding chunks")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut records = Vec::with_capacity(pending.len());
        for batch in pending.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|p| p.document.clone()).collect();
            let embeddings = self.gateway.embed_batch(&texts)?;
            records.extend(batch.iter().zip(embeddings).map(|(p, embedding)| IndexedRecord {
                id: p.id.clone(),
                embedding,
                document: p.document.clone(),
                metadata: p.metadata.clone(),
            }));
            bar.inc(batch.len() as u64);
        }
        bar.finish_and_clear();

        Ok(records)
    }
}

fn read_text(path: &Path) -> Option<String> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Skipping unreadable file {}: {}", path.display(), e);
            return None;
        }
    };

    match decode_text(&bytes, path) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("Skipping {}: {}", path.display(), e);
            None
        }
    }
}

fn ledger_error(error: anyhow::Error) -> RagError {
    RagError::Database(format!("{error:#}"))
}
