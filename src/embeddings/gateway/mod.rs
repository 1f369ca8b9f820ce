
use std::sync::Arc;
use tracing::debug;

use super::Embedder;
use crate::{RagError, Result};

/// Stand-in text embedded in place of blank input
pub const EMPTY_DOCUMENT_SENTINEL: &str = "empty document";

/// Front door to the embedding model.
///
/// Blank input is never forwarded to the model; it is swapped for
/// [`EMPTY_DOCUMENT_SENTINEL`]. When a dimension is configured every returned
/// vector is checked against it.
#[derive(Clone)]
pub struct EmbeddingGateway {
    embedder: Arc<dyn Embedder>,
    dimension: Option<usize>,
}

impl std::fmt::Debug for EmbeddingGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingGateway")
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl EmbeddingGateway {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            dimension: None,
        }
    }

    #[inline]
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    #[inline]
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = self.embedder.encode(substitute_blank(text))?;
        self.check_dimension(&embedding)?;
        Ok(embedding)
    }

    /// Embed every text in order, applying the blank-input substitution per
    /// element.
    #[inline]
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prepared: Vec<String> = texts
            .iter()
            .map(|text| substitute_blank(text).to_string())
            .collect();
        let substituted = texts.iter().filter(|text| text.trim().is_empty()).count();
        if substituted > 0 {
            debug!("Substituted sentinel for {} blank inputs", substituted);
        }

        let embeddings = self.embedder.encode_batch(&prepared)?;
        if embeddings.len() != texts.len() {
            return Err(RagError::ModelInvocation(format!(
                "Embedder returned {} vectors for {} inputs",
                embeddings.len(),
                texts.len()
            )));
        }
        for embedding in &embeddings {
            self.check_dimension(embedding)?;
        }

        Ok(embeddings)
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        match self.dimension {
            Some(expected) if embedding.len() != expected => {
                Err(RagError::ModelInvocation(format!(
                    "Embedding has {} dimensions, expected {}",
                    embedding.len(),
                    expected
                )))
            }
            _ => Ok(()),
        }
    }
}

fn substitute_blank(text: &str) -> &str {
    if text.trim().is_empty() {
        EMPTY_DOCUMENT_SENTINEL
    } else {
        text
    }
}
