//! Sliding minute-window rate limiting on the KV store.
//!
//! Two counters per client: requests per minute and tokens per minute.
//! Both ride the KV store's atomic window-increment operation, so the
//! 60-second TTL is armed exactly once per window even under concurrent
//! increments.

use std::time::Duration;

use kv::KvClient;

use crate::keys::{ClientKey, RateLimits};

const WINDOW: Duration = Duration::from_secs(60);

/// Rate-limit outcomes that deny or warn.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The request-per-minute cap is exhausted.
    #[error("rate limit exceeded: {current} of {limit} requests per minute")]
    RpmExceeded {
        /// Post-increment request count.
        current: i64,
        /// Applicable cap.
        limit: u32,
    },
    /// The token-per-minute cap is exhausted. The tokens stay recorded:
    /// the cost has already been incurred upstream, so this is a warning
    /// for the next request rather than a rollback.
    #[error("rate limit exceeded: {current} of {limit} tokens per minute")]
    TpmExceeded {
        /// Post-increment token count.
        current: i64,
        /// Applicable cap.
        limit: u64,
    },
    /// The KV store failed.
    #[error(transparent)]
    Kv(#[from] kv::KvError),
}

/// Sliding-window limiter over the shared KV store.
#[derive(Clone)]
pub struct RateLimiter {
    kv: KvClient,
    defaults: RateLimits,
}

impl RateLimiter {
    /// Create a limiter with gateway-wide default limits, applied when a
    /// key does not carry its own. Zero means unlimited.
    pub fn new(kv: KvClient, defaults: RateLimits) -> Self {
        Self { kv, defaults }
    }

    fn rpm_limit(&self, key: &ClientKey) -> u32 {
        if key.rate_limits.rpm > 0 {
            key.rate_limits.rpm
        } else {
            self.defaults.rpm
        }
    }

    fn tpm_limit(&self, key: &ClientKey) -> u64 {
        if key.rate_limits.tpm > 0 {
            key.rate_limits.tpm
        } else {
            self.defaults.tpm
        }
    }

    /// Count one request against the client's minute window and deny when
    /// the cap is exceeded.
    pub async fn allow(&self, key: &ClientKey) -> Result<(), RateLimitError> {
        let limit = self.rpm_limit(key);
        if limit == 0 {
            return Ok(());
        }

        let counter = format!("aibox:ratelimit:{}:rpm", key.client_id);
        let current = self.kv.window_incr(&counter, 1, WINDOW).await?;

        if current > i64::from(limit) {
            log::debug!("rpm limit hit for client {}: {current}/{limit}", key.client_id);
            return Err(RateLimitError::RpmExceeded { current, limit });
        }

        Ok(())
    }

    /// Record consumed tokens against the client's minute window.
    ///
    /// Non-positive counts are ignored. When the cap is exceeded the
    /// tokens remain recorded and `TpmExceeded` is returned for the caller
    /// to surface as a warning.
    pub async fn record_tokens(&self, key: &ClientKey, tokens: i64) -> Result<(), RateLimitError> {
        if tokens <= 0 {
            return Ok(());
        }

        let counter = format!("aibox:ratelimit:{}:tpm", key.client_id);
        let current = self.kv.window_incr(&counter, tokens, WINDOW).await?;

        let limit = self.tpm_limit(key);
        if limit > 0 && current > limit as i64 {
            log::debug!("tpm limit hit for client {}: {current}/{limit}", key.client_id);
            return Err(RateLimitError::TpmExceeded { current, limit });
        }

        Ok(())
    }
}
