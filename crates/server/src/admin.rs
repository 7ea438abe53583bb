//! Admin service: health, readiness, version, key management, and
//! tenant reload.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Serialize;

use auth::{ClientKey, IssueParams};

use crate::AppState;
use crate::error::ServiceError;

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub(crate) enum HealthState {
    Healthy,
}

/// `AdminService.Health`. Public liveness probe.
pub(crate) async fn health() -> (StatusCode, Json<HealthState>) {
    (StatusCode::OK, Json(HealthState::Healthy))
}

#[derive(Debug, Serialize)]
pub(crate) struct ReadyResponse {
    status: &'static str,
    kv: &'static str,
    vector_store: &'static str,
}

/// `AdminService.Ready`. Pings the KV store and the vector store.
pub(crate) async fn ready(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ReadyResponse>) {
    let kv_ok = state.kv.ping().await.is_ok();

    let vector_ok = match &state.rag {
        Some(rag) => rag.ping().await.is_ok(),
        // Nothing to probe when RAG is disabled.
        None => true,
    };

    let response = ReadyResponse {
        status: if kv_ok && vector_ok { "ready" } else { "unready" },
        kv: if kv_ok { "ok" } else { "unreachable" },
        vector_store: if vector_ok { "ok" } else { "unreachable" },
    };

    let status = if kv_ok && vector_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

#[derive(Debug, Serialize)]
pub(crate) struct VersionResponse {
    version: &'static str,
}

/// `AdminService.Version`.
pub(crate) async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Serialize)]
pub(crate) struct IssuedKeyResponse {
    /// The full key string. Shown exactly once.
    key: String,
    key_id: String,
    #[serde(flatten)]
    record: ClientKey,
}

/// Issue a new API key.
pub(crate) async fn issue_key(
    State(state): State<Arc<AppState>>,
    Json(mut params): Json<IssueParams>,
) -> Result<Json<IssuedKeyResponse>, ServiceError> {
    if params.client_id.trim().is_empty() {
        return Err(ServiceError::InvalidArgument("client_id is required".to_string()));
    }

    if let Some(tenant_id) = &params.tenant_id {
        let normalized = tenant::normalize_tenant_id(tenant_id);
        if !tenant::validate_id(&normalized) {
            return Err(ServiceError::InvalidArgument(format!("invalid tenant_id '{tenant_id}'")));
        }
        params.tenant_id = Some(normalized);
    }

    let issued = state.keys.issue(params).await?;

    let mut record = issued.record;
    record.secret_hash.clear();

    log::info!("api key issued: key_id={} client_id={}", issued.key_id, record.client_id);

    Ok(Json(IssuedKeyResponse {
        key: issued.key,
        key_id: issued.key_id,
        record,
    }))
}

#[derive(Debug, Serialize)]
pub(crate) struct KeyListEntry {
    key_id: String,
    #[serde(flatten)]
    record: ClientKey,
}

/// List issued keys. Secret hashes are stripped before serialization.
pub(crate) async fn list_keys(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<KeyListEntry>>, ServiceError> {
    let keys = state.keys.list().await?;

    Ok(Json(
        keys.into_iter()
            .map(|(key_id, record)| KeyListEntry { key_id, record })
            .collect(),
    ))
}

/// Revoke a key by ID.
pub(crate) async fn revoke_key(
    State(state): State<Arc<AppState>>,
    Path(key_id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    if state.keys.revoke(&key_id).await? {
        log::info!("api key revoked: key_id={key_id}");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServiceError::NotFound)
    }
}

/// Re-read the tenant configs directory and return the diff.
pub(crate) async fn reload_tenants(
    State(state): State<Arc<AppState>>,
) -> Result<Json<tenant::ReloadDiff>, ServiceError> {
    let diff = state
        .tenants
        .reload()
        .await
        .map_err(|e| ServiceError::InvalidArgument(format!("reload failed: {e}")))?;

    Ok(Json(diff))
}
