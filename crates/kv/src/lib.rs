//! Thin adapter over a Redis-like key-value store.
//!
//! Two backends share one call surface: a pooled Redis client for real
//! deployments and an in-process map for development mode and tests. The
//! only multi-step invariant (counter increment plus TTL initialization)
//! runs as a server-side script on Redis and under a single lock in
//! memory, so callers never observe a half-applied window.

#![deny(missing_docs)]

mod memory;
mod redis_client;

use std::collections::HashMap;
use std::time::Duration;

pub use memory::MemoryKv;
pub use redis_client::RedisKv;

/// Errors from the KV adapter.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// Failed to reach the store.
    #[error("kv connection error: {0}")]
    Connection(String),
    /// A command failed after the connection was established.
    #[error("kv query error: {0}")]
    Query(String),
}

/// Handle to the configured KV backend.
///
/// Enum dispatch keeps call sites monomorphic; both variants implement the
/// same operation set.
#[derive(Clone)]
pub enum KvClient {
    /// Pooled Redis connection.
    Redis(RedisKv),
    /// In-process map with TTL bookkeeping.
    Memory(MemoryKv),
}

impl KvClient {
    /// Connect to Redis using the given settings, verifying with a PING.
    pub async fn connect(config: &config::RedisConfig) -> Result<Self, KvError> {
        let client = RedisKv::connect(config).await?;
        Ok(KvClient::Redis(client))
    }

    /// Create an in-memory backend.
    pub fn in_memory() -> Self {
        KvClient::Memory(MemoryKv::new())
    }

    /// Whether this client is backed by the in-memory store.
    pub fn is_memory(&self) -> bool {
        matches!(self, KvClient::Memory(_))
    }

    /// Round-trip a PING.
    pub async fn ping(&self) -> Result<(), KvError> {
        match self {
            KvClient::Redis(kv) => kv.ping().await,
            KvClient::Memory(_) => Ok(()),
        }
    }

    /// Get a string value.
    pub async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        match self {
            KvClient::Redis(kv) => kv.get(key).await,
            KvClient::Memory(kv) => Ok(kv.get(key)),
        }
    }

    /// Set a string value with an optional TTL.
    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        match self {
            KvClient::Redis(kv) => kv.set(key, value, ttl).await,
            KvClient::Memory(kv) => {
                kv.set(key, value, ttl);
                Ok(())
            }
        }
    }

    /// Set a string value only if the key does not exist. Returns whether
    /// the write happened.
    pub async fn set_nx(&self, key: &str, value: &str) -> Result<bool, KvError> {
        match self {
            KvClient::Redis(kv) => kv.set_nx(key, value).await,
            KvClient::Memory(kv) => Ok(kv.set_nx(key, value)),
        }
    }

    /// Delete a key. Returns whether it existed.
    pub async fn del(&self, key: &str) -> Result<bool, KvError> {
        match self {
            KvClient::Redis(kv) => kv.del(key).await,
            KvClient::Memory(kv) => Ok(kv.del(key)),
        }
    }

    /// Check for key existence.
    pub async fn exists(&self, key: &str) -> Result<bool, KvError> {
        match self {
            KvClient::Redis(kv) => kv.exists(key).await,
            KvClient::Memory(kv) => Ok(kv.exists(key)),
        }
    }

    /// Set one field of a hash.
    pub async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), KvError> {
        match self {
            KvClient::Redis(kv) => kv.hset(key, field, value).await,
            KvClient::Memory(kv) => {
                kv.hset(key, field, value);
                Ok(())
            }
        }
    }

    /// Read a whole hash.
    pub async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, KvError> {
        match self {
            KvClient::Redis(kv) => kv.hgetall(key).await,
            KvClient::Memory(kv) => Ok(kv.hgetall(key)),
        }
    }

    /// Delete one field of a hash. Returns whether it existed.
    pub async fn hdel(&self, key: &str, field: &str) -> Result<bool, KvError> {
        match self {
            KvClient::Redis(kv) => kv.hdel(key, field).await,
            KvClient::Memory(kv) => Ok(kv.hdel(key, field)),
        }
    }

    /// List keys matching a prefix.
    pub async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        match self {
            KvClient::Redis(kv) => kv.scan_prefix(prefix).await,
            KvClient::Memory(kv) => Ok(kv.scan_prefix(prefix)),
        }
    }

    /// Atomically increment a counter by `amount` and initialize its TTL
    /// to `window` when (and only when) the key has no TTL yet. Returns
    /// the post-increment value.
    ///
    /// On Redis this runs as a single server-side script; two concurrent
    /// increments cannot both skip the TTL initialization.
    pub async fn window_incr(&self, key: &str, amount: i64, window: Duration) -> Result<i64, KvError> {
        match self {
            KvClient::Redis(kv) => kv.window_incr(key, amount, window).await,
            KvClient::Memory(kv) => Ok(kv.window_incr(key, amount, window)),
        }
    }

    /// Remaining TTL of a key in seconds. `None` when the key has no TTL
    /// or does not exist.
    pub async fn ttl(&self, key: &str) -> Result<Option<i64>, KvError> {
        match self {
            KvClient::Redis(kv) => kv.ttl(key).await,
            KvClient::Memory(kv) => Ok(kv.ttl(key)),
        }
    }
}
