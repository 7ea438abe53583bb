//! Retrieval-augmented generation: ingest documents into per-tenant
//! vector collections and retrieve relevant chunks for prompt injection.
//!
//! Ingest pipeline: stream to a temp file under an incremental size cap,
//! extract text, chunk with overlap, embed in batch, upsert points whose
//! IDs carry a random suffix so re-uploads never overwrite prior chunks.
//! Retrieval embeds the query once and searches the tenant's collection
//! with a tenant payload filter.

#![deny(missing_docs)]

mod chunker;
mod embedder;
mod extractor;
mod prompt;
mod service;
mod vectorstore;

pub use chunker::{Chunk, Chunker};
pub use embedder::{Embedder, OllamaEmbedder};
pub use extractor::{ExtractionResult, TextExtractor};
pub use prompt::wrap_document_context;
pub use service::{IngestParams, IngestResult, RagService, RetrievedChunk, StoreInfo};
pub use vectorstore::{
    CollectionInfo, Condition, Filter, Point, QdrantStore, SearchParams, SearchResult, VectorStore,
};

/// Errors from the RAG subsystem.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// Tenant or store ID failed the identifier pattern.
    #[error("invalid identifier '{0}'")]
    InvalidId(String),
    /// The upload exceeded the size cap.
    #[error("file too large: {size} bytes exceeds the {max} byte limit")]
    TooLarge {
        /// Bytes seen so far (or declared).
        size: u64,
        /// The cap.
        max: u64,
    },
    /// The extractor does not understand this MIME type.
    #[error("unsupported mime type '{0}'")]
    UnsupportedMime(String),
    /// Text extraction failed.
    #[error("extraction failed: {0}")]
    Extraction(String),
    /// The embedding API failed.
    #[error("embedding failed: {0}")]
    Embedding(String),
    /// The embedder returned a wrong-shaped batch.
    #[error("embedding mismatch: expected {expected} vectors of {dimensions} dims, got {got}")]
    EmbeddingMismatch {
        /// Number of chunks submitted.
        expected: usize,
        /// Number of vectors returned (or the offending vector length).
        got: usize,
        /// Declared dimensionality.
        dimensions: usize,
    },
    /// The vector store failed.
    #[error("vector store error: {0}")]
    VectorStore(String),
    /// Filesystem failure while spooling the upload.
    #[error("upload io error: {0}")]
    Io(#[from] std::io::Error),
    /// The named store does not exist.
    #[error("store not found")]
    StoreNotFound,
}
