//! Service error taxonomy and its HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Client-facing errors. Messages are already sanitized by the time a
/// value of this type exists; internal detail lives in the logs.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Missing, malformed, or unknown API key.
    #[error("unauthenticated")]
    Unauthenticated,

    /// Key authenticated but lacks the required permission.
    #[error("permission denied")]
    PermissionDenied,

    /// Unknown tenant or store. Deliberately generic: the message never
    /// echoes the requested ID, so tenants cannot be enumerated.
    #[error("not found")]
    NotFound,

    /// Failed validation of sizes, shapes, or identifiers.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A rate limit (RPM or TPM) is exhausted.
    #[error("rate limit exceeded")]
    ResourceExhausted,

    /// A request or upload deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Upstream provider failure, post-sanitization.
    #[error("{0}")]
    Unavailable(String),

    /// Anything that indicates a bug. The payload is logged, never sent.
    #[error("internal error")]
    Internal,
}

impl ServiceError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Unauthenticated => "unauthenticated",
            ServiceError::PermissionDenied => "permission_denied",
            ServiceError::NotFound => "not_found",
            ServiceError::InvalidArgument(_) => "invalid_argument",
            ServiceError::ResourceExhausted => "resource_exhausted",
            ServiceError::DeadlineExceeded => "deadline_exceeded",
            ServiceError::Unavailable(_) => "unavailable",
            ServiceError::Internal => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ServiceError::PermissionDenied => StatusCode::FORBIDDEN,
            ServiceError::NotFound => StatusCode::NOT_FOUND,
            ServiceError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ServiceError::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::Unavailable(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetails,
}

#[derive(Debug, Serialize)]
struct ErrorDetails {
    code: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            log::error!("server error ({}): {}", status.as_u16(), self);
        }

        let body = ErrorBody {
            error: ErrorDetails {
                code: self.code(),
                message: self.to_string(),
                status: status.as_u16(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<kv::KvError> for ServiceError {
    fn from(err: kv::KvError) -> Self {
        log::error!("kv failure: {err}");
        ServiceError::Internal
    }
}

impl From<auth::AuthError> for ServiceError {
    fn from(err: auth::AuthError) -> Self {
        match err {
            auth::AuthError::Kv(e) => {
                log::error!("kv failure during auth: {e}");
                ServiceError::Internal
            }
            auth::AuthError::Record(e) => {
                log::error!("key record failure: {e}");
                ServiceError::Internal
            }
            _ => ServiceError::Unauthenticated,
        }
    }
}

impl From<auth::RateLimitError> for ServiceError {
    fn from(err: auth::RateLimitError) -> Self {
        match err {
            auth::RateLimitError::Kv(e) => {
                log::error!("kv failure during rate limiting: {e}");
                ServiceError::Internal
            }
            _ => ServiceError::ResourceExhausted,
        }
    }
}

impl From<rag::RagError> for ServiceError {
    fn from(err: rag::RagError) -> Self {
        match err {
            rag::RagError::InvalidId(id) => ServiceError::InvalidArgument(format!("invalid identifier '{id}'")),
            rag::RagError::TooLarge { size, max } => {
                ServiceError::InvalidArgument(format!("file too large: {size} bytes exceeds the {max} byte limit"))
            }
            rag::RagError::UnsupportedMime(mime) => {
                ServiceError::InvalidArgument(format!("unsupported mime type '{mime}'"))
            }
            rag::RagError::StoreNotFound => ServiceError::NotFound,
            other => {
                log::error!("rag failure: {other}");
                ServiceError::Unavailable("document store temporarily unavailable".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ServiceError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ServiceError::PermissionDenied.status(), StatusCode::FORBIDDEN);
        assert_eq!(ServiceError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ServiceError::InvalidArgument("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ServiceError::ResourceExhausted.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ServiceError::DeadlineExceeded.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(ServiceError::Unavailable("x".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ServiceError::Internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn not_found_never_echoes_ids() {
        // The Display impl is fixed text; there is no way to smuggle a
        // tenant ID into it.
        assert_eq!(ServiceError::NotFound.to_string(), "not found");
    }
}
