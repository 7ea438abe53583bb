//! The internal, provider-agnostic request and response model.

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user.
    User,
    /// The model.
    Assistant,
}

/// One turn of conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Turn author.
    pub role: Role,
    /// Turn text.
    pub content: String,
}

impl ChatMessage {
    /// Convenience constructor for a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Convenience constructor for an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Normalized token accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt.
    pub input_tokens: u32,
    /// Tokens produced by the model.
    pub output_tokens: u32,
    /// Sum of input and output.
    pub total_tokens: u32,
}

impl Usage {
    /// Build a usage record, deriving the total.
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

/// A source reference attached to generated text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Citation {
    /// A web source.
    Url {
        /// Source URL.
        url: String,
        /// Page title if known.
        title: String,
        /// Start offset in the generated text.
        start: u32,
        /// End offset in the generated text.
        end: u32,
    },
    /// A document from a file store.
    File {
        /// Upstream file identifier.
        file_id: String,
        /// Original filename if known.
        filename: String,
        /// Start offset in the generated text.
        start: u32,
    },
}

/// Provider-agnostic request handed to an adapter.
#[derive(Debug, Clone)]
pub struct GenerateParams {
    /// System instructions.
    pub instructions: String,
    /// The current user message.
    pub user_input: String,
    /// Prior turns, oldest first.
    pub history: Vec<ChatMessage>,
    /// Native continuity handle from a previous response, when the
    /// provider supports it.
    pub response_id: Option<String>,
    /// Resolved provider configuration for this request. Already merged
    /// and copied; adapters treat it as read-only.
    pub config: tenant::ProviderConfig,
    /// Ask the upstream to search attached file stores natively.
    pub enable_file_search: bool,
    /// Ask the upstream to search the web.
    pub enable_web_search: bool,
    /// JSON schema for structured output, when requested.
    pub structured_output: Option<serde_json::Value>,
    /// RAG store identifier, when file search is on.
    pub file_store_id: Option<String>,
    /// Correlation ID for logs.
    pub request_id: String,
    /// Tenant the request runs under.
    pub tenant_id: String,
    /// Authenticated caller.
    pub client_id: String,
    /// Capture upstream request/response bodies for this call.
    pub debug: bool,
}

/// Normalized adapter response.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateResult {
    /// Generated text.
    pub text: String,
    /// Continuity handle for follow-up requests.
    pub response_id: Option<String>,
    /// Token accounting.
    pub usage: Usage,
    /// Source references.
    pub citations: Vec<Citation>,
    /// Model that actually served the request.
    pub model: String,
    /// Provider name.
    pub provider: String,
}

/// One streamed event.
///
/// Contract: `TextDelta.index` is strictly monotonically increasing within
/// a stream, and exactly one terminal chunk (`Complete` or `Error`) ends
/// it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Incremental text.
    TextDelta {
        /// Appended text.
        text: String,
        /// Monotonic position of this delta.
        index: u64,
    },
    /// Mid-stream usage report.
    UsageUpdate {
        /// Usage so far.
        usage: Usage,
    },
    /// A citation discovered mid-stream.
    CitationUpdate {
        /// The citation.
        citation: Citation,
    },
    /// Terminal success chunk.
    Complete {
        /// Continuity handle.
        response_id: Option<String>,
        /// Serving model.
        model: String,
        /// Provider name.
        provider: String,
        /// Final usage.
        final_usage: Usage,
    },
    /// Terminal failure chunk.
    Error {
        /// Stable error code.
        code: String,
        /// Sanitized message.
        message: String,
        /// Whether a retry on another provider could help.
        retryable: bool,
    },
}

impl StreamChunk {
    /// Whether this chunk ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamChunk::Complete { .. } | StreamChunk::Error { .. })
    }
}

/// A lazy sequence of stream chunks from an adapter.
pub type GenerateStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;
