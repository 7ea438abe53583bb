//! Adapter error taxonomy and retry classification.

use thiserror::Error;

/// Errors surfaced by provider adapters.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The upstream rejected our credentials.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The request itself was malformed or rejected by validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The upstream model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The upstream rate limited us.
    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    /// The upstream reported overload.
    #[error("provider overloaded: {0}")]
    Overloaded(String),

    /// Any other upstream HTTP error.
    #[error("provider API error ({status}): {message}")]
    ProviderApi {
        /// HTTP status from the upstream.
        status: u16,
        /// Upstream error body.
        message: String,
    },

    /// Transport-level failure before or during the exchange.
    #[error("connection error: {0}")]
    Connection(String),

    /// The caller went away; never retried.
    #[error("request cancelled")]
    Cancelled,

    /// The request deadline passed; never retried.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The provider does not implement streaming.
    #[error("streaming not supported by this provider")]
    StreamingNotSupported,

    /// Programmer error or invariant violation. The payload, when
    /// present, came from the upstream and is safe to log; `None` means
    /// an internal failure whose details were already logged.
    #[error("internal error")]
    Internal(Option<String>),
}

impl LlmError {
    /// Whether another attempt (same or different provider) could
    /// plausibly succeed.
    ///
    /// Retryable: HTTP 408/425/429/5xx, overload and rate-limit
    /// signals, and transport errors that look transient. Authentication
    /// and validation failures, cancellation, and expired deadlines are
    /// never retried.
    pub fn retryable(&self) -> bool {
        match self {
            LlmError::RateLimited(_) | LlmError::Overloaded(_) => true,
            LlmError::ProviderApi { status, .. } => {
                matches!(status, 408 | 425 | 429) || (500..600).contains(status)
            }
            LlmError::Connection(message) => {
                let lower = message.to_ascii_lowercase();
                lower.contains("timeout")
                    || lower.contains("timed out")
                    || lower.contains("connection reset")
                    || lower.contains("eof")
                    || lower.contains("temporary")
                    || lower.contains("rate limit")
                    || lower.contains("overloaded")
            }
            LlmError::AuthenticationFailed(_)
            | LlmError::InvalidRequest(_)
            | LlmError::ModelNotFound(_)
            | LlmError::Cancelled
            | LlmError::DeadlineExceeded
            | LlmError::StreamingNotSupported
            | LlmError::Internal(_) => false,
        }
    }

    /// Map an upstream HTTP status and body into the taxonomy. Shared by
    /// every HTTP adapter.
    pub(crate) fn from_status(status: u16, body: String) -> Self {
        match status {
            400 => LlmError::InvalidRequest(body),
            401 | 403 => LlmError::AuthenticationFailed(body),
            404 => LlmError::ModelNotFound(body),
            408 | 425 => LlmError::ProviderApi { status, message: body },
            429 => LlmError::RateLimited(body),
            529 => LlmError::Overloaded(body),
            // Every other status, 500 included, stays in the ProviderApi
            // class so the 5xx range retries and fails over uniformly.
            _ => LlmError::ProviderApi { status, message: body },
        }
    }

    /// Map a reqwest transport error, distinguishing timeouts.
    pub(crate) fn from_transport(context: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Connection(format!("{context}: request timed out"))
        } else {
            LlmError::Connection(format!("{context}: {err}"))
        }
    }

    /// Stable machine-readable code for the stream error chunk.
    pub fn code(&self) -> &'static str {
        match self {
            LlmError::AuthenticationFailed(_) => "unauthenticated",
            LlmError::InvalidRequest(_) | LlmError::StreamingNotSupported => "invalid_argument",
            LlmError::ModelNotFound(_) => "not_found",
            LlmError::RateLimited(_) => "resource_exhausted",
            LlmError::Overloaded(_) | LlmError::Connection(_) | LlmError::ProviderApi { .. } => "unavailable",
            LlmError::Cancelled => "cancelled",
            LlmError::DeadlineExceeded => "deadline_exceeded",
            LlmError::Internal(_) => "internal",
        }
    }
}
