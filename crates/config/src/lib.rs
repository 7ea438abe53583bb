//! Environment-driven configuration for the aibox gateway.
//!
//! Everything the process needs at startup comes from environment
//! variables. Invalid numeric or boolean values log a warning and fall
//! back to the documented default; missing TLS material with TLS enabled
//! is a startup error.

#![deny(missing_docs)]

mod env;
mod rag;
mod redis;
mod tls;

use std::collections::HashMap;
use std::path::PathBuf;

pub use env::{parse_bool_or, parse_u16_or, parse_u32_or, parse_usize_or};
pub use rag::RagConfig;
pub use redis::RedisConfig;
pub use tls::TlsServerConfig;

/// Errors raised while assembling the gateway configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TLS was enabled without both a certificate and a key file.
    #[error("AIBOX_TLS_ENABLED is set but {0} is missing")]
    IncompleteTls(&'static str),
    /// The startup mode string was not recognized.
    #[error("invalid AIBOX_MODE '{0}': expected 'production' or 'development'")]
    InvalidMode(String),
}

/// Startup mode of the gateway.
///
/// Development mode permits the in-memory KV fallback when Redis is
/// unreachable; production mode refuses to start without it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartupMode {
    /// Strict mode: all backing services must be reachable.
    Production,
    /// Permissive mode for local development.
    #[default]
    Development,
}

impl StartupMode {
    /// Whether this is production mode.
    pub fn is_production(self) -> bool {
        matches!(self, StartupMode::Production)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Structured JSON lines.
    #[default]
    Json,
    /// Human-readable text.
    Text,
}

/// Top-level gateway configuration assembled from the environment.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Directory holding one tenant config file per tenant.
    pub configs_dir: PathBuf,
    /// Port the public listener binds to.
    pub port: u16,
    /// Host address the public listener binds to.
    pub host: String,
    /// Optional TLS material for the public listener.
    pub tls: Option<TlsServerConfig>,
    /// Redis connection settings.
    pub redis: RedisConfig,
    /// Log level string understood by the logger (`error`..`trace`).
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
    /// Bootstrap token granting admin access before any key exists.
    pub admin_token: Option<String>,
    /// Startup mode.
    pub mode: StartupMode,
    /// RAG subsystem settings.
    pub rag: RagConfig,
}

impl EnvConfig {
    /// Assemble configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars().collect())
    }

    /// Assemble configuration from an explicit variable map.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| vars.get(name).map(String::as_str).filter(|v| !v.is_empty());

        let tls_enabled = parse_bool_or("AIBOX_TLS_ENABLED", get("AIBOX_TLS_ENABLED"), false);

        let tls = if tls_enabled {
            let certificate = get("AIBOX_TLS_CERT_FILE")
                .map(PathBuf::from)
                .ok_or(ConfigError::IncompleteTls("AIBOX_TLS_CERT_FILE"))?;

            let key = get("AIBOX_TLS_KEY_FILE")
                .map(PathBuf::from)
                .ok_or(ConfigError::IncompleteTls("AIBOX_TLS_KEY_FILE"))?;

            Some(TlsServerConfig { certificate, key })
        } else {
            None
        };

        let mode = match get("AIBOX_MODE") {
            None => StartupMode::Development,
            Some("production") => StartupMode::Production,
            Some("development") => StartupMode::Development,
            Some(other) => return Err(ConfigError::InvalidMode(other.to_string())),
        };

        let log_format = match get("AIBOX_LOG_FORMAT") {
            Some("text") => LogFormat::Text,
            Some("json") | None => LogFormat::Json,
            Some(other) => {
                log::warn!("invalid AIBOX_LOG_FORMAT '{other}', falling back to json");
                LogFormat::Json
            }
        };

        Ok(Self {
            configs_dir: get("AIBOX_CONFIGS_DIR").map(PathBuf::from).unwrap_or_else(|| "configs".into()),
            port: parse_u16_or("AIBOX_GRPC_PORT", get("AIBOX_GRPC_PORT"), 50051),
            host: get("AIBOX_HOST").unwrap_or("0.0.0.0").to_string(),
            tls,
            redis: RedisConfig::from_vars(&vars),
            log_level: get("AIBOX_LOG_LEVEL").unwrap_or("info").to_string(),
            log_format,
            admin_token: get("AIBOX_ADMIN_TOKEN").map(str::to_string),
            mode,
            rag: RagConfig::from_vars(&vars),
        })
    }
}
