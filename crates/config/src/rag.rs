//! RAG subsystem settings.

use std::collections::HashMap;

use crate::env::{parse_bool_or, parse_usize_or};

/// Settings for document ingestion and retrieval.
#[derive(Debug, Clone)]
pub struct RagConfig {
    /// Whether the RAG subsystem is wired up at all.
    pub enabled: bool,
    /// Approximate chunk size in characters.
    pub chunk_size: usize,
    /// Back-overlap between consecutive chunks in characters.
    pub chunk_overlap: usize,
    /// Default number of chunks returned by retrieval.
    pub retrieval_top_k: usize,
    /// Base URL of the embedding API.
    pub embedder_url: String,
    /// Embedding model name.
    pub embedder_model: String,
    /// Base URL of the vector store REST API.
    pub vector_url: String,
}

impl RagConfig {
    pub(crate) fn from_vars(vars: &HashMap<String, String>) -> Self {
        let get = |name: &str| vars.get(name).map(String::as_str).filter(|v| !v.is_empty());

        Self {
            enabled: parse_bool_or("RAG_ENABLED", get("RAG_ENABLED"), true),
            chunk_size: parse_usize_or("RAG_CHUNK_SIZE", get("RAG_CHUNK_SIZE"), 1000),
            chunk_overlap: parse_usize_or("RAG_CHUNK_OVERLAP", get("RAG_CHUNK_OVERLAP"), 200),
            retrieval_top_k: parse_usize_or("RAG_RETRIEVAL_TOP_K", get("RAG_RETRIEVAL_TOP_K"), 5),
            embedder_url: get("RAG_EMBEDDER_URL").unwrap_or("http://localhost:11434").to_string(),
            embedder_model: get("RAG_EMBEDDER_MODEL").unwrap_or("nomic-embed-text").to_string(),
            vector_url: get("RAG_VECTOR_URL").unwrap_or("http://localhost:6333").to_string(),
        }
    }
}
