//! Request and response envelopes for the public API.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use llm::{ChatMessage, Citation, Usage};

/// Chat request envelope, shared by the unary, streaming, and
/// provider-selection operations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateRequest {
    /// Tenant the request runs under.
    #[serde(default)]
    pub tenant_id: String,

    /// System instructions.
    #[serde(default)]
    pub instructions: String,

    /// Current user message.
    #[serde(default)]
    pub user_input: String,

    /// Prior turns, oldest first.
    #[serde(default)]
    pub conversation_history: Vec<ChatMessage>,

    /// Provider to prefer over the tenant default.
    #[serde(default)]
    pub preferred_provider: Option<String>,

    /// Model override for the selected provider.
    #[serde(default)]
    pub model_override: Option<String>,

    /// Inject retrieved document context into the prompt.
    #[serde(default)]
    pub enable_file_search: bool,

    /// Let the upstream search the web.
    #[serde(default)]
    pub enable_web_search: bool,

    /// RAG store to retrieve from.
    #[serde(default)]
    pub file_store_id: Option<String>,

    /// Continuity handle from a previous response.
    #[serde(default)]
    pub previous_response_id: Option<String>,

    /// JSON schema for structured output.
    #[serde(default)]
    pub structured_output: Option<serde_json::Value>,

    /// Per-provider overrides merged over the tenant configuration.
    #[serde(default)]
    pub provider_configs: HashMap<String, ProviderOverride>,

    /// Fail over to another provider when the primary fails.
    #[serde(default)]
    pub enable_failover: bool,

    /// Preferred fallback provider.
    #[serde(default)]
    pub fallback_provider: Option<String>,

    /// Caller-supplied client identifier (informational; authentication
    /// comes from the API key).
    #[serde(default)]
    pub client_id: Option<String>,

    /// Caller-supplied correlation ID.
    #[serde(default)]
    pub request_id: Option<String>,

    /// Free-form request metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Request-level provider configuration overrides.
///
/// These merge into a copy of the tenant's provider config; the tenant
/// snapshot itself is never touched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderOverride {
    /// Replacement API key.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Replacement base URL. Requires the admin permission and SSRF
    /// validation.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Replacement model.
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub temperature: Option<f64>,

    #[serde(default)]
    pub top_p: Option<f64>,

    #[serde(default)]
    pub max_output_tokens: Option<u32>,

    /// Extra options; request keys override tenant keys in the merged
    /// copy.
    #[serde(default)]
    pub extra_options: HashMap<String, String>,
}

/// Chat response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateResponse {
    /// Generated text.
    pub text: String,

    /// Continuity handle for the next request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,

    /// Token accounting.
    pub usage: Usage,

    /// Source references.
    pub citations: Vec<Citation>,

    /// Model that served the request.
    pub model: String,

    /// Provider that served the request.
    pub provider: String,

    /// Whether the response came from a fallback provider.
    pub failed_over: bool,

    /// Provider that failed first, when `failed_over` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_provider: Option<String>,

    /// Sanitized description of the original failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_error: Option<String>,

    /// Correlation ID for this request.
    pub request_id: String,
}

/// Response of the provider-selection operation.
#[derive(Debug, Clone, Serialize)]
pub struct SelectProviderResponse {
    /// The provider the gateway would use for this request.
    pub provider: String,

    /// The model that provider would serve.
    pub model: String,
}

/// File store creation request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateFileStoreRequest {
    /// Optional store name; generated when omitted.
    #[serde(default)]
    pub name: Option<String>,
}

/// File store creation response.
#[derive(Debug, Clone, Serialize)]
pub struct CreateFileStoreResponse {
    /// Store identifier.
    pub store_id: String,
    /// Store name.
    pub name: String,
    /// Creation timestamp, RFC 3339.
    pub created_at: String,
}

/// Upload response.
#[derive(Debug, Clone, Serialize)]
pub struct UploadFileResponse {
    /// File identifier within the store.
    pub file_id: String,
    /// Original filename.
    pub filename: String,
    /// Store the file landed in.
    pub store_id: String,
    /// Number of indexed chunks.
    pub chunk_count: usize,
    /// `ready` or `failed`.
    pub status: String,
}

/// One store in a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStoreSummary {
    /// Store identifier.
    pub store_id: String,
    /// Store name.
    pub name: String,
    /// Creation timestamp, RFC 3339.
    pub created_at: String,
}

/// Store metadata response.
#[derive(Debug, Clone, Serialize)]
pub struct GetFileStoreResponse {
    /// Store identifier.
    pub store_id: String,
    /// Store name.
    pub name: String,
    /// Number of indexed chunks.
    pub chunk_count: u64,
    /// Vector dimensionality.
    pub dimensions: usize,
    /// Creation timestamp when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}
