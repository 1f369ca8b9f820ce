// Database module
// Vector storage (LanceDB or in-memory) plus the SQLite ingestion ledger

pub mod lancedb;
pub mod memory;
pub mod sqlite;


pub use self::lancedb::VectorStore;
pub use memory::MemoryVectorStore;
pub use sqlite::Database;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Metadata stored with every chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub filename: String,
    pub filepath: String,
    pub chunk_index: u64,
    /// Extension after the last `.`, or `txt`
    pub language: String,
    pub start_line: u64,
    pub end_line: u64,
}

/// One chunk as persisted in the vector store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedRecord {
    /// `<filename>_<chunk_index>`
    pub id: String,
    pub embedding: Vec<f32>,
    pub document: String,
    pub metadata: ChunkMetadata,
}

impl IndexedRecord {
    #[inline]
    pub fn record_id(filename: &str, chunk_index: usize) -> String {
        format!("{filename}_{chunk_index}")
    }
}

/// A nearest-neighbour hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub document: String,
    pub metadata: ChunkMetadata,
    /// Squared L2 distance to the query, lower is closer
    pub distance: f32,
}

/// Nearest-neighbour store for chunk embeddings.
///
/// `query` returns at most `k` hits ordered by ascending distance and fails
/// with [`crate::RagError::StoreUnavailable`] while no collection exists.
/// `upsert` overwrites records whose id is already present.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, records: Vec<IndexedRecord>) -> Result<()>;

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<SearchResult>>;

    /// Number of stored records, zero when no collection exists
    async fn count(&self) -> Result<usize>;

    async fn delete_ids(&self, ids: &[String]) -> Result<()>;

    async fn list_ids(&self) -> Result<Vec<String>>;

    /// Drop the collection and everything in it
    async fn clear(&self) -> Result<()>;
}
