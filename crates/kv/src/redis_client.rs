//! Redis implementation of the KV surface.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use deadpool::managed::{self, Metrics, RecycleError};
use redis::{RedisError, Script, aio::MultiplexedConnection};

use crate::KvError;

/// Counter increment with conditional TTL initialization.
///
/// Setting the TTL unconditionally would reset the window on every call;
/// setting it only on the first increment from the client side races.
/// TTL == -1 means "key exists without expiry", which is exactly the
/// just-created state after INCRBY on a fresh key.
const WINDOW_INCR_SCRIPT: &str = include_str!("scripts/window_incr.lua");

type Pool = managed::Pool<ConnectionManager>;

/// Hands multiplexed connections to the pool and probes idle ones before
/// reuse.
struct ConnectionManager {
    client: redis::Client,
}

impl managed::Manager for ConnectionManager {
    type Type = MultiplexedConnection;
    type Error = RedisError;

    async fn create(&self) -> Result<MultiplexedConnection, RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    async fn recycle(&self, conn: &mut MultiplexedConnection, _: &Metrics) -> managed::RecycleResult<RedisError> {
        // A connection can go stale while parked in the pool; discard it
        // as soon as a round-trip stops working.
        let reply: String = redis::cmd("PING").query_async(conn).await.map_err(|e| {
            log::debug!("discarding pooled Redis connection: {e}");
            RecycleError::Backend(e)
        })?;

        if reply == "PONG" {
            Ok(())
        } else {
            log::debug!("discarding pooled Redis connection: unexpected PING reply '{reply}'");
            Err(RecycleError::message("unexpected PING reply"))
        }
    }
}

fn build_pool(config: &config::RedisConfig) -> Result<Pool, KvError> {
    let client = redis::Client::open(config.url().as_str())
        .map_err(|e| KvError::Connection(format!("invalid Redis url: {e}")))?;

    let mut pool_config = managed::PoolConfig::default();
    pool_config.max_size = config.pool_max_size;

    Pool::builder(ConnectionManager { client })
        .config(pool_config)
        .runtime(deadpool::Runtime::Tokio1)
        .build()
        .map_err(|e| KvError::Connection(format!("failed to build Redis pool: {e}")))
}

/// Pooled Redis client.
#[derive(Clone)]
pub struct RedisKv {
    pool: Pool,
    window_incr_script: Arc<Script>,
}

impl RedisKv {
    /// Build the pool and verify connectivity with a PING.
    pub async fn connect(config: &config::RedisConfig) -> Result<Self, KvError> {
        let pool = build_pool(config)?;

        let mut conn = pool
            .get()
            .await
            .map_err(|e| KvError::Connection(format!("failed to get Redis connection: {e}")))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| KvError::Connection(format!("failed to ping Redis: {e}")))?;

        Ok(Self {
            pool,
            window_incr_script: Arc::new(Script::new(WINDOW_INCR_SCRIPT)),
        })
    }

    async fn conn(&self) -> Result<managed::Object<ConnectionManager>, KvError> {
        self.pool.get().await.map_err(|e| KvError::Connection(e.to_string()))
    }

    pub(crate) async fn ping(&self) -> Result<(), KvError> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| KvError::Query(e.to_string()))?;
        Ok(())
    }

    pub(crate) async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn().await?;
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut *conn)
            .await
            .map_err(|e| KvError::Query(e.to_string()))
    }

    pub(crate) async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        let mut conn = self.conn().await?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }

        let _: () = cmd
            .query_async(&mut *conn)
            .await
            .map_err(|e| KvError::Query(e.to_string()))?;
        Ok(())
    }

    pub(crate) async fn set_nx(&self, key: &str, value: &str) -> Result<bool, KvError> {
        let mut conn = self.conn().await?;
        let set: bool = redis::cmd("SETNX")
            .arg(key)
            .arg(value)
            .query_async(&mut *conn)
            .await
            .map_err(|e| KvError::Query(e.to_string()))?;
        Ok(set)
    }

    pub(crate) async fn del(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.conn().await?;
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut *conn)
            .await
            .map_err(|e| KvError::Query(e.to_string()))?;
        Ok(removed > 0)
    }

    pub(crate) async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.conn().await?;
        let n: i64 = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut *conn)
            .await
            .map_err(|e| KvError::Query(e.to_string()))?;
        Ok(n > 0)
    }

    pub(crate) async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), KvError> {
        let mut conn = self.conn().await?;
        let _: () = redis::cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .query_async(&mut *conn)
            .await
            .map_err(|e| KvError::Query(e.to_string()))?;
        Ok(())
    }

    pub(crate) async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, KvError> {
        let mut conn = self.conn().await?;
        redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut *conn)
            .await
            .map_err(|e| KvError::Query(e.to_string()))
    }

    pub(crate) async fn hdel(&self, key: &str, field: &str) -> Result<bool, KvError> {
        let mut conn = self.conn().await?;
        let removed: i64 = redis::cmd("HDEL")
            .arg(key)
            .arg(field)
            .query_async(&mut *conn)
            .await
            .map_err(|e| KvError::Query(e.to_string()))?;
        Ok(removed > 0)
    }

    pub(crate) async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        let mut conn = self.conn().await?;
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut *conn)
                .await
                .map_err(|e| KvError::Query(e.to_string()))?;

            keys.extend(batch);
            cursor = next;

            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }

    pub(crate) async fn window_incr(&self, key: &str, amount: i64, window: Duration) -> Result<i64, KvError> {
        let mut conn = self.conn().await?;

        self.window_incr_script
            .key(key)
            .arg(amount)
            .arg(window.as_secs().max(1))
            .invoke_async(&mut *conn)
            .await
            .map_err(|e| KvError::Query(format!("window_incr script failed: {e}")))
    }

    pub(crate) async fn ttl(&self, key: &str) -> Result<Option<i64>, KvError> {
        let mut conn = self.conn().await?;
        let ttl: i64 = redis::cmd("TTL")
            .arg(key)
            .query_async(&mut *conn)
            .await
            .map_err(|e| KvError::Query(e.to_string()))?;

        // -2 = missing key, -1 = no expiry
        if ttl < 0 { Ok(None) } else { Ok(Some(ttl)) }
    }
}
