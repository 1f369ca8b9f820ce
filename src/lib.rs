use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    /// The vector collection does not exist yet; nothing has been ingested.
    #[error("Vector store unavailable: {0}. Ingest a codebase first with `code-doc-helper ingest <path>`")]
    StoreUnavailable(String),

    /// Embedding or generation call failed (transport, auth or protocol).
    #[error("Model invocation failed: {0}")]
    ModelInvocation(String),

    #[error("Model call timed out: {0}")]
    ModelTimeout(String),

    #[error("Could not decode file as text: {0}")]
    Decode(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod generation;
mod http;
pub mod ingest;
pub mod ollama;
pub mod pipeline;
pub mod retrieval;

#[cfg(test)]
pub(crate) mod test_support;
