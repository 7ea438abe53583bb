//! File service: RAG store management and streamed uploads.
//!
//! These operations authenticate in-handler because the upload body must
//! stream straight to disk, so authentication, tenant resolution, and
//! permission checks run here against the same helpers the chain uses;
//! the chain still times the request and writes the completion log,
//! fed the caller identity through [`FileRouteIdentity`]. Every operation
//! takes its tenant from the authenticated request context; the
//! collection namespace is always `<tenant_id>_<store_id>`.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::{Extension, Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use futures::TryStreamExt;
use rand::RngCore;

use auth::{ClientKey, Permission};
use rag::IngestParams;

use crate::AppState;
use crate::error::ServiceError;
use crate::interceptor::{FileRouteIdentity, authenticate, resolve_tenant};
use crate::wire::{
    CreateFileStoreRequest, CreateFileStoreResponse, FileStoreSummary, GetFileStoreResponse, UploadFileResponse,
};

/// Whole-upload deadline, independent of the caller's patience.
const UPLOAD_DEADLINE: Duration = Duration::from_secs(300);

fn stores_index_key(tenant_id: &str) -> String {
    format!("aibox:stores:{tenant_id}")
}

#[derive(serde::Serialize, serde::Deserialize)]
struct StoreIndexEntry {
    name: String,
    created_at: String,
}

/// Authenticate and authorize a file operation, resolving its tenant
/// from the `x-tenant-id` header or the key's binding. The identity
/// lands in the chain's log slot as soon as each piece is known, so even
/// denied requests log who asked.
async fn file_context(
    state: &AppState,
    headers: &HeaderMap,
    identity: &FileRouteIdentity,
) -> Result<(ClientKey, String), ServiceError> {
    let client = authenticate(state, headers).await?;
    identity.record(&client.client_id, "-");

    if !client.allows(Permission::Files) {
        return Err(ServiceError::PermissionDenied);
    }

    state.limiter.allow(&client).await?;

    let requested = headers
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let (tenant_id, _) = resolve_tenant(state, &client, requested)?;
    identity.record(&client.client_id, &tenant_id);

    Ok((client, tenant_id))
}

fn rag_service(state: &AppState) -> Result<&Arc<rag::RagService>, ServiceError> {
    state
        .rag
        .as_ref()
        .ok_or_else(|| ServiceError::Unavailable("document store is not enabled".to_string()))
}

/// `FileService.CreateFileStore`.
pub(crate) async fn create_store(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<FileRouteIdentity>,
    headers: HeaderMap,
    Json(request): Json<CreateFileStoreRequest>,
) -> Result<Json<CreateFileStoreResponse>, ServiceError> {
    let (_, tenant_id) = file_context(&state, &headers, &identity).await?;
    let rag = rag_service(&state)?;

    let store_id = match request.name.as_deref().filter(|n| !n.is_empty()) {
        Some(name) => {
            if !tenant::validate_id(name) {
                return Err(ServiceError::InvalidArgument(format!("invalid store name '{name}'")));
            }
            name.to_string()
        }
        None => {
            let mut suffix = [0u8; 6];
            rand::thread_rng().fill_bytes(&mut suffix);
            format!("store-{}", hex::encode(suffix))
        }
    };

    rag.create_store(&tenant_id, &store_id).await?;

    let created_at = chrono::Utc::now().to_rfc3339();
    let entry = StoreIndexEntry {
        name: store_id.clone(),
        created_at: created_at.clone(),
    };
    state
        .kv
        .hset(
            &stores_index_key(&tenant_id),
            &store_id,
            &serde_json::to_string(&entry).unwrap_or_default(),
        )
        .await?;

    log::info!("file store created: tenant_id={tenant_id} store_id={store_id}");

    Ok(Json(CreateFileStoreResponse {
        name: store_id.clone(),
        store_id,
        created_at,
    }))
}

/// `FileService.UploadFile`.
///
/// The body streams to disk; it is never buffered in memory, and the
/// size cap is enforced as chunks arrive.
pub(crate) async fn upload_file(
    State(state): State<Arc<AppState>>,
    Path(store_id): Path<String>,
    Extension(identity): Extension<FileRouteIdentity>,
    request: Request,
) -> Result<Json<UploadFileResponse>, ServiceError> {
    let headers = request.headers().clone();
    let (_, tenant_id) = file_context(&state, &headers, &identity).await?;
    let rag = rag_service(&state)?.clone();

    let filename = headers
        .get("x-filename")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServiceError::InvalidArgument("x-filename header is required".to_string()))?
        .to_string();

    let mime_type = headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let declared_size = headers
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());

    let data = request
        .into_body()
        .into_data_stream()
        .map_err(|e| std::io::Error::other(e.to_string()));

    let params = IngestParams {
        tenant_id: tenant_id.clone(),
        store_id: store_id.clone(),
        filename: filename.clone(),
        mime_type,
        declared_size,
        data: Box::pin(data),
    };

    let result = tokio::time::timeout(UPLOAD_DEADLINE, rag.ingest(params))
        .await
        .map_err(|_| ServiceError::DeadlineExceeded)??;

    log::info!(
        "file uploaded and indexed: tenant_id={tenant_id} store_id={store_id} filename={filename} \
         chunks={}",
        result.chunk_count
    );

    Ok(Json(UploadFileResponse {
        file_id: result.file_id,
        filename,
        store_id,
        chunk_count: result.chunk_count,
        status: "ready".to_string(),
    }))
}

/// `FileService.DeleteFileStore`.
pub(crate) async fn delete_store(
    State(state): State<Arc<AppState>>,
    Path(store_id): Path<String>,
    Extension(identity): Extension<FileRouteIdentity>,
    headers: HeaderMap,
) -> Result<StatusCode, ServiceError> {
    let (_, tenant_id) = file_context(&state, &headers, &identity).await?;
    let rag = rag_service(&state)?;

    rag.delete_store(&tenant_id, &store_id).await?;
    state.kv.hdel(&stores_index_key(&tenant_id), &store_id).await?;

    log::info!("file store deleted: tenant_id={tenant_id} store_id={store_id}");
    Ok(StatusCode::NO_CONTENT)
}

/// `FileService.GetFileStore`.
pub(crate) async fn get_store(
    State(state): State<Arc<AppState>>,
    Path(store_id): Path<String>,
    Extension(identity): Extension<FileRouteIdentity>,
    headers: HeaderMap,
) -> Result<Json<GetFileStoreResponse>, ServiceError> {
    let (_, tenant_id) = file_context(&state, &headers, &identity).await?;
    let rag = rag_service(&state)?;

    let info = rag.store_info(&tenant_id, &store_id).await?;

    let index = state.kv.hgetall(&stores_index_key(&tenant_id)).await?;
    let entry: Option<StoreIndexEntry> = index
        .get(&store_id)
        .and_then(|raw| serde_json::from_str(raw).ok());

    Ok(Json(GetFileStoreResponse {
        store_id: store_id.clone(),
        name: entry.as_ref().map(|e| e.name.clone()).unwrap_or(store_id),
        chunk_count: info.point_count,
        dimensions: info.dimensions,
        created_at: entry.map(|e| e.created_at),
    }))
}

/// `FileService.ListFileStores`.
///
/// Served from the KV-side tenant→stores index rather than enumerating
/// vector-store collections; the index keeps tenancy explicit and carries
/// creation metadata the collection cannot.
pub(crate) async fn list_stores(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<FileRouteIdentity>,
    headers: HeaderMap,
) -> Result<Json<Vec<FileStoreSummary>>, ServiceError> {
    let (_, tenant_id) = file_context(&state, &headers, &identity).await?;

    let index = state.kv.hgetall(&stores_index_key(&tenant_id)).await?;

    let mut stores: Vec<FileStoreSummary> = index
        .into_iter()
        .filter_map(|(store_id, raw)| {
            let entry: StoreIndexEntry = serde_json::from_str(&raw).ok()?;
            Some(FileStoreSummary {
                store_id,
                name: entry.name,
                created_at: entry.created_at,
            })
        })
        .collect();

    stores.sort_by(|a, b| a.store_id.cmp(&b.store_id));
    Ok(Json(stores))
}
