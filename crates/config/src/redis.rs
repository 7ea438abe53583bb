//! Redis connection settings.

use std::collections::HashMap;
use std::time::Duration;

use crate::env::{parse_u32_or, parse_usize_or};

/// Settings for the Redis-backed KV store.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// `host:port` of the Redis server.
    pub addr: String,
    /// Optional AUTH password.
    pub password: Option<String>,
    /// Logical database index.
    pub db: u32,
    /// Maximum pooled connections.
    pub pool_max_size: usize,
    /// Per-command response timeout.
    pub response_timeout: Duration,
}

impl RedisConfig {
    pub(crate) fn from_vars(vars: &HashMap<String, String>) -> Self {
        let get = |name: &str| vars.get(name).map(String::as_str).filter(|v| !v.is_empty());

        Self {
            addr: get("REDIS_ADDR").unwrap_or("localhost:6379").to_string(),
            password: get("REDIS_PASSWORD").map(str::to_string),
            db: parse_u32_or("REDIS_DB", get("REDIS_DB"), 0),
            pool_max_size: parse_usize_or("REDIS_POOL_MAX_SIZE", get("REDIS_POOL_MAX_SIZE"), 16),
            response_timeout: Duration::from_secs(1),
        }
    }

    /// Connection URL in the form `redis://[:password@]host:port/db`.
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!("redis://:{password}@{}/{}", self.addr, self.db),
            None => format!("redis://{}/{}", self.addr, self.db),
        }
    }
}
