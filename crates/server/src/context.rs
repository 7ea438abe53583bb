//! Per-request context attached by the interceptor chain.

use std::sync::Arc;

use auth::ClientKey;
use tenant::TenantConfig;

/// Everything the interceptor chain resolved about a request, handed to
/// handlers as an axum extension.
#[derive(Clone)]
pub struct RequestContext {
    /// The authenticated caller.
    pub client: ClientKey,
    /// The resolved tenant snapshot, for operations that need one.
    pub tenant: Option<Arc<TenantConfig>>,
    /// Normalized tenant ID, when resolved.
    pub tenant_id: Option<String>,
    /// Correlation ID: caller-supplied or generated.
    pub request_id: String,
}

impl RequestContext {
    /// The tenant snapshot, or `not found` when the operation requires
    /// one and none was resolved.
    pub fn require_tenant(&self) -> Result<(&str, &Arc<TenantConfig>), crate::error::ServiceError> {
        match (&self.tenant_id, &self.tenant) {
            (Some(id), Some(config)) => Ok((id.as_str(), config)),
            _ => Err(crate::error::ServiceError::NotFound),
        }
    }
}
