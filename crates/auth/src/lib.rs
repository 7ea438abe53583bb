//! API-key authentication and per-client rate limiting.
//!
//! Keys are minted as `aibox_sk_<keyID>_<secret>`, stored in the KV store
//! under `aibox:key:<keyID>` with a bcrypt hash of the secret, and
//! verified on every request. Rate limits are sliding minute windows kept
//! as atomic counters next to the keys.

#![deny(missing_docs)]

mod keys;
mod ratelimit;

pub use keys::{ClientKey, IssueParams, IssuedKey, KeyStore, Permission, RateLimits, parse_key};
pub use ratelimit::{RateLimitError, RateLimiter};

/// Errors from key authentication.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The presented key did not match the expected format.
    #[error("malformed API key")]
    MalformedKey,
    /// No key record exists for the presented key ID.
    #[error("unknown API key")]
    UnknownKey,
    /// The secret did not match the stored hash.
    #[error("invalid API key secret")]
    BadSecret,
    /// The key is past its expiry timestamp.
    #[error("API key expired")]
    Expired,
    /// Key ID generation kept colliding with existing records.
    #[error("could not allocate a unique key ID")]
    IdExhausted,
    /// The KV store failed.
    #[error(transparent)]
    Kv(#[from] kv::KvError),
    /// Hashing or record encoding failed.
    #[error("key record error: {0}")]
    Record(String),
}
