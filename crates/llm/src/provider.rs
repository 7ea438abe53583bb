//! The provider adapter seam.

pub(crate) mod anthropic;
pub(crate) mod gemini;
mod history;
pub(crate) mod openai;
mod retry;

use async_trait::async_trait;

use crate::{GenerateParams, GenerateResult, GenerateStream, LlmError};

pub(crate) use history::{ShapeOptions, shape_history};
pub(crate) use retry::with_retries;

/// One upstream LLM API.
///
/// Adapters own message shaping, retry policy, stream translation, usage
/// and citation normalization for their upstream. `async_trait` keeps the
/// trait dyn-compatible for the registry.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Registry name of this provider.
    fn name(&self) -> &'static str;

    /// Whether streaming responses are implemented.
    fn supports_streaming(&self) -> bool {
        true
    }

    /// Whether the upstream can search attached file stores natively.
    fn supports_file_search(&self) -> bool {
        false
    }

    /// Whether the upstream can search the web.
    fn supports_web_search(&self) -> bool {
        false
    }

    /// Whether the upstream supports `previous_response_id` continuity.
    fn supports_native_continuity(&self) -> bool {
        false
    }

    /// Run one generation to completion.
    async fn generate_reply(&self, params: &GenerateParams) -> crate::Result<GenerateResult>;

    /// Start a streaming generation.
    ///
    /// The returned stream ends with exactly one terminal chunk. Dropping
    /// it cancels the upstream call.
    async fn generate_reply_stream(&self, _params: &GenerateParams) -> crate::Result<GenerateStream> {
        Err(LlmError::StreamingNotSupported)
    }
}
