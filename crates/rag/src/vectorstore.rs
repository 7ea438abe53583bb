//! Vector store adapter over the Qdrant REST API.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};

use crate::RagError;

/// A vector with its metadata payload.
#[derive(Debug, Clone, Serialize)]
pub struct Point {
    /// Unique point identifier.
    pub id: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// Metadata: tenant_id, store_id, filename, file_id, chunk_index,
    /// text.
    pub payload: Value,
}

/// Equality condition on a payload field.
#[derive(Debug, Clone)]
pub struct Condition {
    /// Payload field name.
    pub field: String,
    /// Value that must match exactly.
    pub matches: Value,
}

/// Conjunction of payload conditions.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    /// All conditions must hold.
    pub must: Vec<Condition>,
}

/// Parameters for a similarity search.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Collection to search.
    pub collection: String,
    /// Query vector.
    pub vector: Vec<f32>,
    /// Maximum results.
    pub limit: usize,
    /// Optional payload filter.
    pub filter: Option<Filter>,
}

/// One search hit.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Point identifier.
    pub id: String,
    /// Similarity score, higher is closer.
    pub score: f32,
    /// Point payload.
    pub payload: Value,
}

/// Collection metadata.
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    /// Collection name.
    pub name: String,
    /// Number of stored points.
    pub point_count: u64,
    /// Vector dimensionality.
    pub dimensions: usize,
}

/// Storage of named collections of vectors with payloads.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a collection with the given dimensionality.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<(), RagError>;

    /// Delete a collection and all its points.
    async fn delete_collection(&self, name: &str) -> Result<(), RagError>;

    /// Whether a collection exists.
    async fn collection_exists(&self, name: &str) -> Result<bool, RagError>;

    /// Collection metadata.
    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, RagError>;

    /// Add or replace the listed points.
    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<(), RagError>;

    /// Similarity search.
    async fn search(&self, params: SearchParams) -> Result<Vec<SearchResult>, RagError>;

    /// Delete specific points by ID.
    async fn delete_points(&self, collection: &str, ids: &[String]) -> Result<(), RagError>;

    /// Connectivity check, used by readiness probes.
    async fn ping(&self) -> Result<(), RagError>;
}

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Qdrant REST implementation.
pub struct QdrantStore {
    client: reqwest::Client,
    base_url: String,
}

impl QdrantStore {
    /// Build a store client from the RAG settings.
    pub fn new(config: &config::RagConfig) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RagError::VectorStore(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.vector_url.trim_end_matches('/').to_string(),
        })
    }

    async fn request(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> Result<Value, RagError> {
        let url = format!("{}{path}", self.base_url);
        let mut builder = self.client.request(method, &url);

        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RagError::VectorStore(format!("request to {path}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::VectorStore(format!("qdrant error (status {status}): {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| RagError::VectorStore(format!("decode response: {e}")))
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<(), RagError> {
        let body = json!({
            "vectors": {
                "size": dimensions,
                "distance": "Cosine",
            }
        });

        self.request(reqwest::Method::PUT, &format!("/collections/{name}"), Some(body))
            .await?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), RagError> {
        self.request(reqwest::Method::DELETE, &format!("/collections/{name}"), None)
            .await?;
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, RagError> {
        let url = format!("{}/collections/{name}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RagError::VectorStore(format!("request: {e}")))?;

        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(RagError::VectorStore(format!("qdrant error (status {status}): {body}")))
            }
        }
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, RagError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/collections/{name}"), None)
            .await?;

        let result = &response["result"];
        let point_count = result["points_count"].as_u64().unwrap_or(0);
        let dimensions = result["config"]["params"]["vectors"]["size"].as_u64().unwrap_or(0) as usize;

        Ok(CollectionInfo {
            name: name.to_string(),
            point_count,
            dimensions,
        })
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<(), RagError> {
        let body = json!({ "points": points });

        // wait=true: the write is durable before ingest reports success.
        self.request(
            reqwest::Method::PUT,
            &format!("/collections/{collection}/points?wait=true"),
            Some(body),
        )
        .await?;
        Ok(())
    }

    async fn search(&self, params: SearchParams) -> Result<Vec<SearchResult>, RagError> {
        let mut body = json!({
            "vector": params.vector,
            "limit": params.limit,
            "with_payload": true,
        });

        if let Some(filter) = &params.filter
            && !filter.must.is_empty()
        {
            let must: Vec<Value> = filter
                .must
                .iter()
                .map(|c| json!({"key": c.field, "match": {"value": c.matches}}))
                .collect();
            body["filter"] = json!({ "must": must });
        }

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/search", params.collection),
                Some(body),
            )
            .await?;

        let Some(hits) = response["result"].as_array() else {
            return Ok(Vec::new());
        };

        let results = hits
            .iter()
            .map(|hit| {
                // IDs come back as strings or numbers depending on how
                // they were written.
                let id = match &hit["id"] {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => String::new(),
                };

                SearchResult {
                    id,
                    score: hit["score"].as_f64().unwrap_or(0.0) as f32,
                    payload: hit["payload"].clone(),
                }
            })
            .collect();

        Ok(results)
    }

    async fn delete_points(&self, collection: &str, ids: &[String]) -> Result<(), RagError> {
        let body = json!({ "points": ids });

        self.request(
            reqwest::Method::POST,
            &format!("/collections/{collection}/points/delete?wait=true"),
            Some(body),
        )
        .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), RagError> {
        let url = format!("{}/collections", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RagError::VectorStore(format!("ping: {e}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(RagError::VectorStore(format!("ping: status {}", response.status())))
        }
    }
}
