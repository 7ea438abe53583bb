//! The ordered interceptor chain applied to every RPC.
//!
//! Order is fixed: skip list → authentication → tenant resolution →
//! rate limit → permission → logging. File operations carry their own
//! authorization (the upload is a raw stream the chain must not buffer),
//! so they sit on the skip list together with the public health probe.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use auth::{ClientKey, Permission};
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use serde::Deserialize;

use crate::AppState;
use crate::context::RequestContext;
use crate::error::ServiceError;

/// Methods that bypass the chain entirely.
const SKIP_EXACT: &[&str] = &["/health"];

/// File operations authenticate in-handler (the upload body must stream
/// to disk untouched), so they skip the chain's auth steps but still get
/// its completion log.
const FILE_PREFIX: &str = "/v1/files";

/// Largest chat body the chain will buffer for tenant resolution. The
/// envelope's own limits are far below this.
const MAX_BUFFERED_BODY: usize = 10 * 1024 * 1024;

/// Required permission per method. Admin satisfies everything.
fn required_permission(path: &str) -> Option<Permission> {
    match path {
        "/v1/chat/reply" | "/v1/chat/provider" => Some(Permission::Chat),
        "/v1/chat/reply/stream" => Some(Permission::ChatStream),
        path if path.starts_with("/v1/admin") => Some(Permission::Admin),
        _ => None,
    }
}

fn is_chat_method(path: &str) -> bool {
    path.starts_with("/v1/chat")
}

/// The minimal slice of a chat payload the chain needs before handlers
/// parse the full envelope.
#[derive(Debug, Default, Deserialize)]
struct PayloadProbe {
    #[serde(default)]
    tenant_id: String,
    #[serde(default)]
    request_id: Option<String>,
}

/// Identity slot the file service fills once its in-handler
/// authentication resolves, so the completion log for file routes still
/// carries `client_id` and `tenant_id`.
#[derive(Clone, Default)]
pub(crate) struct FileRouteIdentity(pub(crate) Arc<Mutex<Option<(String, String)>>>);

impl FileRouteIdentity {
    pub(crate) fn record(&self, client_id: &str, tenant_id: &str) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = Some((client_id.to_string(), tenant_id.to_string()));
        }
    }
}

/// Authenticate a request from its headers.
///
/// Accepts `authorization: Bearer <key>` or `x-api-key: <key>`. The
/// bootstrap admin token and the development stub are handled here so
/// every entry point shares one policy.
pub(crate) async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<ClientKey, ServiceError> {
    if state.dev_auth_stub {
        log::debug!("development auth stub active: injecting synthetic admin key");
        return Ok(ClientKey::synthetic_admin("dev"));
    }

    let token = bearer_token(headers).ok_or(ServiceError::Unauthenticated)?;

    if let Some(admin_token) = &state.env.admin_token
        && token == admin_token
    {
        return Ok(ClientKey::synthetic_admin("admin-token"));
    }

    Ok(state.keys.authenticate(token).await?)
}

fn header_request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get(http::header::AUTHORIZATION) {
        let value = value.to_str().ok()?;
        return value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer "));
    }

    headers.get("x-api-key").and_then(|v| v.to_str().ok())
}

/// Resolve the tenant for an authenticated request.
pub(crate) fn resolve_tenant(
    state: &AppState,
    client: &ClientKey,
    requested: &str,
) -> Result<(String, Arc<tenant::TenantConfig>), ServiceError> {
    // Fall back to the key's bound tenant when the request names none.
    let requested = if requested.trim().is_empty() {
        client.tenant_id.as_deref().unwrap_or("")
    } else {
        requested
    };

    let normalized = tenant::normalize_tenant_id(requested);
    if normalized.is_empty() {
        return Err(ServiceError::NotFound);
    }

    // A bound key only authorizes its own tenant. The error is the same
    // generic `not found` as an unknown tenant, so callers cannot probe
    // which tenants exist.
    if let Some(bound) = &client.tenant_id
        && tenant::normalize_tenant_id(bound) != normalized
    {
        log::warn!(
            "tenant mismatch: key for client '{}' is bound to a different tenant than requested",
            client.client_id
        );
        return Err(ServiceError::NotFound);
    }

    let config = state.tenants.get(&normalized).ok_or(ServiceError::NotFound)?;
    Ok((normalized, config))
}

/// The chain itself, applied as axum middleware.
pub(crate) async fn intercept(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let path = request.uri().path().to_string();
    let method = request.method().clone();

    if SKIP_EXACT.contains(&path.as_str()) {
        return Ok(next.run(request).await);
    }

    let started = Instant::now();

    if path.starts_with(FILE_PREFIX) {
        let request_id = header_request_id(request.headers()).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let identity = FileRouteIdentity::default();
        let mut request = request;
        request.extensions_mut().insert(identity.clone());

        let response = next.run(request).await;
        let latency_ms = started.elapsed().as_millis();
        let status = response.status().as_u16();

        let (client_id, tenant_id) = identity
            .0
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
            .unwrap_or_else(|| ("-".to_string(), "-".to_string()));

        log::info!(
            "request completed: request_id={request_id} tenant_id={tenant_id} client_id={client_id} \
             method=\"{method} {path}\" status={status} latency_ms={latency_ms}"
        );

        return Ok(response);
    }

    // 1. Authenticate.
    let client = authenticate(&state, request.headers()).await?;

    // 2. Resolve the tenant: chat methods carry it in the payload,
    //    everything else in the x-tenant-id header.
    let (mut request, probe) = if is_chat_method(&path) {
        let (parts, body) = request.into_parts();
        let bytes = axum::body::to_bytes(body, MAX_BUFFERED_BODY)
            .await
            .map_err(|_| ServiceError::InvalidArgument("request body too large".to_string()))?;

        let probe: PayloadProbe = serde_json::from_slice(&bytes).unwrap_or_default();
        (Request::from_parts(parts, Body::from(bytes)), probe)
    } else {
        let header_tenant = request
            .headers()
            .get("x-tenant-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let probe = PayloadProbe {
            tenant_id: header_tenant,
            request_id: None,
        };
        (request, probe)
    };

    let (tenant_id, tenant) = if is_chat_method(&path) {
        let (id, config) = resolve_tenant(&state, &client, &probe.tenant_id)?;
        (Some(id), Some(config))
    } else if !probe.tenant_id.trim().is_empty() {
        let (id, config) = resolve_tenant(&state, &client, &probe.tenant_id)?;
        (Some(id), Some(config))
    } else {
        (None, None)
    };

    // 3. Rate limit.
    state.limiter.allow(&client).await?;

    // 4. Permission.
    if let Some(required) = required_permission(&path)
        && !client.allows(required)
    {
        return Err(ServiceError::PermissionDenied);
    }

    let request_id = probe
        .request_id
        .filter(|id| !id.is_empty())
        .or_else(|| header_request_id(request.headers()))
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let context = RequestContext {
        client,
        tenant,
        tenant_id,
        request_id,
    };

    request.extensions_mut().insert(context.clone());

    // 5. Run the handler, then log the structured outcome record.
    let response = next.run(request).await;
    let latency_ms = started.elapsed().as_millis();
    let status = response.status().as_u16();

    log::info!(
        "request completed: request_id={} tenant_id={} client_id={} method=\"{method} {path}\" \
         status={status} latency_ms={latency_ms}",
        context.request_id,
        context.tenant_id.as_deref().unwrap_or("-"),
        context.client.client_id,
    );

    Ok(response)
}
