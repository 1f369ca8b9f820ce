// Query-time retrieval: embed the question, fetch the nearest chunks and
// render them into a single context block for the prompt


use std::sync::Arc;
use tracing::debug;

use crate::Result;
use crate::database::{SearchResult, VectorIndex};
use crate::embeddings::EmbeddingGateway;

/// Context used when retrieval produced nothing
pub const NO_CONTEXT_SENTINEL: &str = "No relevant context found.";

/// Reply for a blank question
pub const INVALID_QUERY_MESSAGE: &str = "Please ask a valid question.";

const SEPARATOR_WIDTH: usize = 50;

/// Hits ordered by ascending distance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult(pub Vec<SearchResult>);

impl RetrievalResult {
    #[inline]
    pub fn hits(&self) -> &[SearchResult] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalOutcome {
    Results(RetrievalResult),
    /// The query was blank; nothing was embedded
    InvalidQuery,
}

pub struct Retriever {
    gateway: EmbeddingGateway,
    store: Arc<dyn VectorIndex>,
}

impl Retriever {
    #[inline]
    pub fn new(gateway: EmbeddingGateway, store: Arc<dyn VectorIndex>) -> Self {
        Self { gateway, store }
    }

    /// Fetch the `k` stored chunks closest to `query`.
    ///
    /// Fails with [`crate::RagError::StoreUnavailable`] when nothing has been
    /// ingested yet.
    #[inline]
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalOutcome> {
        if query.trim().is_empty() {
            return Ok(RetrievalOutcome::InvalidQuery);
        }
        if k == 0 {
            return Ok(RetrievalOutcome::Results(RetrievalResult::default()));
        }

        let embedding = self.gateway.embed(query)?;
        let mut hits = self.store.query(&embedding, k).await?;
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);

        debug!("Retrieved {} chunks for query", hits.len());
        Ok(RetrievalOutcome::Results(RetrievalResult(hits)))
    }
}

/// Render retrieved chunks as prompt context
#[inline]
pub fn format_context(result: Option<&RetrievalResult>) -> String {
    let Some(result) = result.filter(|r| !r.is_empty()) else {
        return NO_CONTEXT_SENTINEL.to_string();
    };

    let separator = "─".repeat(SEPARATOR_WIDTH);
    result
        .hits()
        .iter()
        .map(|hit| {
            format!(
                "📄 {} (lines {}-{})\n{}\n{}",
                hit.metadata.filename,
                hit.metadata.start_line,
                hit.metadata.end_line,
                hit.document,
                separator
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
