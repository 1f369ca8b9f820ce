//! In-memory vector store.
//!
//! Brute-force squared-L2 search over a map guarded by a tokio `RwLock`.
//! Like the LanceDB store it has no collection until the first upsert, so
//! queries before that (or after [`VectorIndex::clear`]) report the store as
//! unavailable.

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{IndexedRecord, SearchResult, VectorIndex};
use crate::{RagError, Result};

#[derive(Debug)]
pub struct MemoryVectorStore {
    dimension: usize,
    collection: RwLock<Option<BTreeMap<String, IndexedRecord>>>,
}

impl MemoryVectorStore {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            collection: RwLock::new(None),
        }
    }

    fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(RagError::Database(format!(
                "Vector has {} dimensions, store expects {}",
                vector.len(),
                self.dimension
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorStore {
    async fn upsert(&self, records: Vec<IndexedRecord>) -> Result<()> {
        for record in &records {
            self.check_dimension(&record.embedding)?;
        }

        let mut guard = self.collection.write().await;
        let collection = guard.get_or_insert_with(BTreeMap::new);

        let count = records.len();
        for record in records {
            collection.insert(record.id.clone(), record);
        }
        debug!("Upserted {} records ({} total)", count, collection.len());
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let guard = self.collection.read().await;
        let collection = guard
            .as_ref()
            .ok_or_else(|| RagError::StoreUnavailable("collection does not exist".to_string()))?;
        self.check_dimension(embedding)?;

        let mut hits: Vec<SearchResult> = collection
            .values()
            .map(|record| SearchResult {
                id: record.id.clone(),
                document: record.document.clone(),
                metadata: record.metadata.clone(),
                distance: Self::squared_l2(embedding, &record.embedding),
            })
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self
            .collection
            .read()
            .await
            .as_ref()
            .map_or(0, BTreeMap::len))
    }

    async fn delete_ids(&self, ids: &[String]) -> Result<()> {
        if let Some(collection) = self.collection.write().await.as_mut() {
            for id in ids {
                collection.remove(id);
            }
        }
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .collection
            .read()
            .await
            .as_ref()
            .map(|collection| collection.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear(&self) -> Result<()> {
        *self.collection.write().await = None;
        debug!("Cleared in-memory collection");
        Ok(())
    }
}
