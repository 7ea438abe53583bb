//! Ingest and retrieval orchestration.

use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use rand::RngCore;
use serde_json::json;
use tokio::io::AsyncWriteExt;

use crate::chunker::Chunker;
use crate::embedder::Embedder;
use crate::extractor::TextExtractor;
use crate::vectorstore::{Condition, Filter, Point, SearchParams, VectorStore};
use crate::RagError;

/// Upload size cap, enforced incrementally while the payload streams in.
const MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Bytes of randomness in a point ID suffix. Re-uploading the same
/// filename must never overwrite prior chunks.
const POINT_ID_SUFFIX_BYTES: usize = 8;

/// The byte stream of an upload.
pub type UploadStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Parameters for ingesting one document.
pub struct IngestParams {
    /// Tenant owning the store.
    pub tenant_id: String,
    /// Target store.
    pub store_id: String,
    /// Original filename.
    pub filename: String,
    /// Declared MIME type.
    pub mime_type: String,
    /// Size the client claimed, if any; checked before spooling.
    pub declared_size: Option<u64>,
    /// The document bytes.
    pub data: UploadStream,
}

/// Outcome of an ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestResult {
    /// Identifier for the ingested file within its store.
    pub file_id: String,
    /// Number of chunks indexed.
    pub chunk_count: usize,
    /// Pages reported by the extractor.
    pub page_count: usize,
}

/// One retrieved context chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    /// Chunk text.
    pub text: String,
    /// Source filename.
    pub filename: String,
    /// Chunk position within its file.
    pub chunk_index: u64,
    /// Similarity score.
    pub score: f32,
}

/// Store metadata surfaced to the file service.
#[derive(Debug, Clone)]
pub struct StoreInfo {
    /// Collection name.
    pub name: String,
    /// Number of stored points (chunks).
    pub point_count: u64,
    /// Vector dimensionality.
    pub dimensions: usize,
}

/// Orchestrates extract→chunk→embed→upsert and query→embed→search.
pub struct RagService {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    extractor: TextExtractor,
    chunker: Chunker,
    default_top_k: usize,
}

impl RagService {
    /// Assemble the service from its collaborators and settings.
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>, config: &config::RagConfig) -> Self {
        Self {
            store,
            embedder,
            extractor: TextExtractor,
            chunker: Chunker::new(config.chunk_size, config.chunk_overlap),
            default_top_k: config.retrieval_top_k,
        }
    }

    /// Collection name for a tenant/store pair. Both halves must pass the
    /// identifier pattern or the name is rejected.
    pub fn collection_name(tenant_id: &str, store_id: &str) -> Result<String, RagError> {
        if !tenant::validate_id(tenant_id) {
            return Err(RagError::InvalidId(tenant_id.to_string()));
        }
        if !tenant::validate_id(store_id) {
            return Err(RagError::InvalidId(store_id.to_string()));
        }
        Ok(format!("{tenant_id}_{store_id}"))
    }

    /// Create a store (vector collection) for a tenant.
    pub async fn create_store(&self, tenant_id: &str, store_id: &str) -> Result<(), RagError> {
        let collection = Self::collection_name(tenant_id, store_id)?;
        self.store
            .create_collection(&collection, self.embedder.dimensions())
            .await
    }

    /// Delete a store and everything in it.
    pub async fn delete_store(&self, tenant_id: &str, store_id: &str) -> Result<(), RagError> {
        let collection = Self::collection_name(tenant_id, store_id)?;
        self.store.delete_collection(&collection).await
    }

    /// Whether a store exists.
    pub async fn store_exists(&self, tenant_id: &str, store_id: &str) -> Result<bool, RagError> {
        let collection = Self::collection_name(tenant_id, store_id)?;
        self.store.collection_exists(&collection).await
    }

    /// Store metadata; `StoreNotFound` when the collection is missing.
    pub async fn store_info(&self, tenant_id: &str, store_id: &str) -> Result<StoreInfo, RagError> {
        let collection = Self::collection_name(tenant_id, store_id)?;

        if !self.store.collection_exists(&collection).await? {
            return Err(RagError::StoreNotFound);
        }

        let info = self.store.collection_info(&collection).await?;
        Ok(StoreInfo {
            name: info.name,
            point_count: info.point_count,
            dimensions: info.dimensions,
        })
    }

    /// Readiness probe against the vector store.
    pub async fn ping(&self) -> Result<(), RagError> {
        self.store.ping().await
    }

    /// Ingest one document: spool to disk under the size cap, extract,
    /// chunk, embed, and upsert.
    pub async fn ingest(&self, params: IngestParams) -> Result<IngestResult, RagError> {
        let collection = Self::collection_name(&params.tenant_id, &params.store_id)?;

        if let Some(declared) = params.declared_size
            && declared > MAX_UPLOAD_BYTES
        {
            return Err(RagError::TooLarge {
                size: declared,
                max: MAX_UPLOAD_BYTES,
            });
        }

        if !self.store.collection_exists(&collection).await? {
            return Err(RagError::StoreNotFound);
        }

        // Spool to a temp file rather than memory; the cap is enforced as
        // chunks arrive, not after.
        let spool = tempfile::NamedTempFile::new()?;
        let mut file = tokio::fs::File::from_std(spool.reopen()?);
        let mut data = params.data;
        let mut total: u64 = 0;

        while let Some(chunk) = data.next().await {
            let chunk = chunk?;
            total += chunk.len() as u64;

            if total > MAX_UPLOAD_BYTES {
                return Err(RagError::TooLarge {
                    size: total,
                    max: MAX_UPLOAD_BYTES,
                });
            }

            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        let raw = tokio::fs::read(spool.path()).await?;
        let extracted = self.extractor.extract(&raw, &params.mime_type)?;

        let file_id = format!("{}_{}", params.store_id, params.filename);
        let chunks = self.chunker.chunk(&extracted.text);

        if chunks.is_empty() {
            log::warn!(
                "ingest of '{}' into {collection} produced no chunks",
                params.filename
            );
            return Ok(IngestResult {
                file_id,
                chunk_count: 0,
                page_count: extracted.page_count,
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let dimensions = self.embedder.dimensions();
        if embeddings.len() != chunks.len() {
            return Err(RagError::EmbeddingMismatch {
                expected: chunks.len(),
                got: embeddings.len(),
                dimensions,
            });
        }
        for embedding in &embeddings {
            if embedding.len() != dimensions {
                return Err(RagError::EmbeddingMismatch {
                    expected: chunks.len(),
                    got: embedding.len(),
                    dimensions,
                });
            }
        }

        let points: Vec<Point> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, vector)| {
                let mut suffix = [0u8; POINT_ID_SUFFIX_BYTES];
                rand::thread_rng().fill_bytes(&mut suffix);

                Point {
                    id: format!(
                        "{}_{}_{}_{}",
                        params.filename,
                        params.store_id,
                        chunk.index,
                        hex::encode(suffix)
                    ),
                    vector,
                    payload: json!({
                        "tenant_id": params.tenant_id,
                        "store_id": params.store_id,
                        "filename": params.filename,
                        "file_id": file_id,
                        "chunk_index": chunk.index,
                        "text": chunk.text,
                    }),
                }
            })
            .collect();

        let chunk_count = points.len();
        self.store.upsert(&collection, points).await?;

        log::info!(
            "ingested '{}' into {collection}: {chunk_count} chunks, {} pages",
            params.filename,
            extracted.page_count
        );

        Ok(IngestResult {
            file_id,
            chunk_count,
            page_count: extracted.page_count,
        })
    }

    /// Retrieve the `top_k` most similar chunks for a query. Zero or
    /// negative `top_k` uses the service default. Results arrive ordered
    /// by descending similarity.
    pub async fn retrieve(
        &self,
        tenant_id: &str,
        store_id: &str,
        query: &str,
        top_k: i64,
    ) -> Result<Vec<RetrievedChunk>, RagError> {
        let collection = Self::collection_name(tenant_id, store_id)?;

        let limit = if top_k <= 0 { self.default_top_k } else { top_k as usize };
        let vector = self.embedder.embed(query).await?;

        let results = self
            .store
            .search(SearchParams {
                collection,
                vector,
                limit,
                filter: Some(Filter {
                    must: vec![Condition {
                        field: "tenant_id".to_string(),
                        matches: json!(tenant_id),
                    }],
                }),
            })
            .await?;

        Ok(results
            .into_iter()
            .map(|hit| RetrievedChunk {
                text: hit.payload["text"].as_str().unwrap_or_default().to_string(),
                filename: hit.payload["filename"].as_str().unwrap_or_default().to_string(),
                chunk_index: hit.payload["chunk_index"].as_u64().unwrap_or(0),
                score: hit.score,
            })
            .collect())
    }
}
