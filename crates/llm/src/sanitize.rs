//! Error sanitization at the client boundary.
//!
//! Known failure classes map to short public strings; anything else
//! becomes a generic message while the original is logged server-side
//! with full request context. The sanitizer never emits upstream URLs,
//! API keys, or stack traces.

use crate::LlmError;

/// `(substring, public message)` pairs checked in order against the
/// lowercased error text.
const CLIENT_SAFE_PATTERNS: &[(&str, &str)] = &[
    ("rate limit", "rate limit exceeded"),
    ("quota", "quota exceeded"),
    ("timeout", "request timed out"),
    ("timed out", "request timed out"),
    ("deadline", "request timed out"),
    ("cancel", "request cancelled"),
    ("invalid api", "authentication failed with provider"),
    ("unauthorized", "authentication failed with provider"),
    ("authentication", "authentication failed with provider"),
    ("forbidden", "access denied by provider"),
    ("not found", "resource not found"),
];

/// Fallback for anything unrecognized.
pub const GENERIC_PROVIDER_ERROR: &str = "provider temporarily unavailable";

/// Match raw error text against the known-safe patterns.
pub fn match_safe_pattern(text: &str) -> Option<&'static str> {
    let lower = text.to_ascii_lowercase();
    CLIENT_SAFE_PATTERNS
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map(|(_, safe)| *safe)
}

/// Map an adapter error to a client-safe string, logging the original.
pub fn sanitize_for_client(err: &LlmError, request_id: &str, tenant_id: &str, client_id: &str, provider: &str) -> String {
    let text = err.to_string();

    if let Some(safe) = match_safe_pattern(&text) {
        log::debug!(
            "sanitized provider error for client: request_id={request_id} provider={provider} original={text}"
        );
        return safe.to_string();
    }

    log::error!(
        "provider error (sanitized for client): request_id={request_id} tenant_id={tenant_id} \
         client_id={client_id} provider={provider} error={text}"
    );
    GENERIC_PROVIDER_ERROR.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitize(err: &LlmError) -> String {
        sanitize_for_client(err, "req-1", "acme", "client-1", "openai")
    }

    #[test]
    fn known_patterns_map_to_short_strings() {
        let cases = [
            (LlmError::RateLimited("429 too many".into()), "rate limit exceeded"),
            (
                LlmError::InvalidRequest("quota exhausted for org".into()),
                "quota exceeded",
            ),
            (LlmError::Connection("request timed out".into()), "request timed out"),
            (LlmError::Cancelled, "request cancelled"),
            (
                LlmError::AuthenticationFailed("invalid api key sk-abc123".into()),
                "authentication failed with provider",
            ),
            (
                LlmError::ModelNotFound("model not found: gpt-9".into()),
                "resource not found",
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(sanitize(&err), expected);
        }
    }

    #[test]
    fn unknown_errors_become_generic() {
        let err = LlmError::ProviderApi {
            status: 502,
            message: "upstream said: https://internal.example/api?key=sk-secret".to_string(),
        };
        assert_eq!(sanitize(&err), GENERIC_PROVIDER_ERROR);
    }

    #[test]
    fn sanitized_output_never_contains_secrets() {
        let err = LlmError::ProviderApi {
            status: 503,
            message: "Bearer sk-live-deadbeef at https://api.vendor.com/v1".to_string(),
        };
        let out = sanitize(&err);
        assert!(!out.contains("sk-live"));
        assert!(!out.contains("https://"));
    }
}
