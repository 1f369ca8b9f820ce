// Embeddings module
// Line-based chunking and the gateway in front of the embedding model

pub mod chunking;
pub mod gateway;

pub use chunking::{Chunk, DEFAULT_CHUNK_SIZE, chunk_text};
pub use gateway::{EMPTY_DOCUMENT_SENTINEL, EmbeddingGateway};

use crate::Result;

/// An opaque text to vector function.
///
/// Implementations block on I/O; callers running inside an async context are
/// expected to tolerate that the same way the rest of the crate does.
pub trait Embedder: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving order
    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.encode(text)).collect()
    }
}
