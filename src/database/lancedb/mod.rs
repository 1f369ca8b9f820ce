// LanceDB vector database module
// Persistent similarity search over chunk embeddings

pub mod vector_store;

pub use vector_store::VectorStore;
