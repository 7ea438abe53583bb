//! Provider-agnostic LLM access.
//!
//! The gateway's internal request shape (`GenerateParams`) is mapped by
//! one adapter per upstream into that upstream's wire format. Adapters
//! normalize responses, token usage, citations, and streaming chunks into
//! the shared taxonomy, classify errors for retry, and never leak
//! upstream details past the sanitizer.

mod capture;
mod error;
mod generate;
pub mod provider;
mod registry;
mod sanitize;

pub use error::LlmError;
pub use generate::{
    ChatMessage, Citation, GenerateParams, GenerateResult, GenerateStream, Role, StreamChunk, Usage,
};
pub use provider::Provider;
pub use registry::ProviderRegistry;
pub use sanitize::{GENERIC_PROVIDER_ERROR, match_safe_pattern, sanitize_for_client};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LlmError>;
