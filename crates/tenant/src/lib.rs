//! Per-tenant configuration: on-disk model, secret resolution, directory
//! loading, and the copy-on-write snapshot manager.
//!
//! Tenant files live one-per-tenant under a configs directory as JSON or
//! YAML. Loading resolves secret references, validates every provider,
//! and publishes an immutable snapshot; reload builds a complete new
//! snapshot before swapping it in, so readers never observe a half-built
//! map.

#![deny(missing_docs)]

mod config;
mod loader;
mod manager;
mod secrets;

pub use config::{
    FailoverConfig, ProviderConfig, TenantConfig, TenantRagConfig, normalize_tenant_id, validate_id,
};
pub use loader::load_tenants;
pub use manager::{ReloadDiff, TenantManager};
pub use secrets::SecretResolver;

/// Errors raised while loading or validating tenant configuration.
#[derive(Debug, thiserror::Error)]
pub enum TenantError {
    /// The configs directory could not be read.
    #[error("configs directory {0}: {1}")]
    Directory(String, #[source] std::io::Error),
    /// The directory contained no tenant configs.
    #[error("no tenant configs found in {0}")]
    Empty(String),
    /// A config file failed to parse.
    #[error("parsing {file}: {message}")]
    Parse {
        /// Offending file.
        file: String,
        /// Decoder error text.
        message: String,
    },
    /// Two files declared the same tenant ID.
    #[error("duplicate tenant_id '{0}'")]
    DuplicateTenant(String),
    /// A secret reference could not be resolved.
    #[error("tenant '{tenant}' provider '{provider}' api_key: {message}")]
    Secret {
        /// Tenant being loaded.
        tenant: String,
        /// Provider whose key failed.
        provider: String,
        /// Resolution error text.
        message: String,
    },
    /// A config failed semantic validation.
    #[error("tenant '{tenant}': {message}")]
    Invalid {
        /// Tenant being loaded.
        tenant: String,
        /// Validation error text.
        message: String,
    },
}
