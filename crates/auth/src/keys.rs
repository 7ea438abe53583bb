//! API-key issuance, lookup, and verification.

use chrono::{DateTime, Utc};
use kv::KvClient;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::AuthError;

const KEY_PREFIX: &str = "aibox_sk_";
const STORAGE_PREFIX: &str = "aibox:key:";

/// Key IDs are 16 hex chars at issuance but parsing accepts 8 or more, so
/// the ID width can grow without invalidating old keys.
const MIN_KEY_ID_LEN: usize = 8;
const KEY_ID_BYTES: usize = 8;
const SECRET_BYTES: usize = 16;
const ID_ALLOC_ATTEMPTS: usize = 5;

/// A capability grantable to a client key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Full access, implies every other permission.
    Admin,
    /// Unary chat completions.
    Chat,
    /// Streaming chat completions.
    ChatStream,
    /// RAG file store management.
    Files,
}

/// Requests-per-minute and tokens-per-minute caps. Zero means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    /// Requests per minute.
    #[serde(default)]
    pub rpm: u32,
    /// Tokens per minute.
    #[serde(default)]
    pub tpm: u64,
}

/// Stored record for an authenticated caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientKey {
    /// Opaque identifier chosen by the issuer.
    pub client_id: String,
    /// Human-readable label.
    pub client_name: String,
    /// bcrypt hash of the key secret. Stripped from listings.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_hash: String,
    /// Granted permissions.
    pub permissions: Vec<Permission>,
    /// Per-client rate limits; zero fields fall back to the defaults.
    #[serde(default)]
    pub rate_limits: RateLimits,
    /// Tenant the key is bound to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Issuance timestamp.
    pub created_at: DateTime<Utc>,
    /// Optional expiry timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ClientKey {
    /// Whether this key satisfies the given requirement. Admin satisfies
    /// everything.
    pub fn allows(&self, required: Permission) -> bool {
        self.permissions
            .iter()
            .any(|p| *p == Permission::Admin || *p == required)
    }

    /// Whether the key is past its expiry.
    pub fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }

    /// A synthetic key with all permissions, used by the development-mode
    /// stub interceptor and the admin bootstrap token.
    pub fn synthetic_admin(client_id: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_name: client_id.to_string(),
            secret_hash: String::new(),
            permissions: vec![Permission::Admin],
            rate_limits: RateLimits::default(),
            tenant_id: None,
            created_at: Utc::now(),
            expires_at: None,
        }
    }
}

/// Parameters for minting a new key.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueParams {
    /// Opaque caller identifier.
    pub client_id: String,
    /// Human-readable label.
    pub client_name: String,
    /// Granted permissions.
    pub permissions: Vec<Permission>,
    /// Per-client limits; omitted fields use the gateway defaults.
    #[serde(default)]
    pub rate_limits: RateLimits,
    /// Optional tenant binding.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Optional expiry.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Result of issuance: the one-time visible key string and the stored
/// record.
#[derive(Debug)]
pub struct IssuedKey {
    /// The full `aibox_sk_…` string. Shown once, never stored.
    pub key: String,
    /// The key ID half of the string.
    pub key_id: String,
    /// The persisted record.
    pub record: ClientKey,
}

/// Split a presented key into `(key_id, secret)`.
///
/// The key ID is variable-length hex (at least 8 chars) so the ID width
/// can widen later without breaking old keys.
pub fn parse_key(presented: &str) -> Result<(&str, &str), AuthError> {
    let rest = presented.strip_prefix(KEY_PREFIX).ok_or(AuthError::MalformedKey)?;
    let (key_id, secret) = rest.split_once('_').ok_or(AuthError::MalformedKey)?;

    if key_id.len() < MIN_KEY_ID_LEN || !key_id.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(AuthError::MalformedKey);
    }
    if secret.is_empty() {
        return Err(AuthError::MalformedKey);
    }

    Ok((key_id, secret))
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Issues, loads, verifies, and revokes client keys against the KV store.
#[derive(Clone)]
pub struct KeyStore {
    kv: KvClient,
}

impl KeyStore {
    /// Create a key store over the given KV backend.
    pub fn new(kv: KvClient) -> Self {
        Self { kv }
    }

    /// Mint a new key. The secret is only ever visible in the returned
    /// string; the record carries its bcrypt hash.
    pub async fn issue(&self, params: IssueParams) -> Result<IssuedKey, AuthError> {
        let secret = random_hex(SECRET_BYTES);
        let secret_hash =
            bcrypt::hash(&secret, bcrypt::DEFAULT_COST).map_err(|e| AuthError::Record(e.to_string()))?;

        let record = ClientKey {
            client_id: params.client_id,
            client_name: params.client_name,
            secret_hash,
            permissions: params.permissions,
            rate_limits: params.rate_limits,
            tenant_id: params.tenant_id,
            created_at: Utc::now(),
            expires_at: params.expires_at,
        };

        let payload = serde_json::to_string(&record).map_err(|e| AuthError::Record(e.to_string()))?;

        // Retry on ID collision; SETNX makes the claim atomic.
        for _ in 0..ID_ALLOC_ATTEMPTS {
            let key_id = random_hex(KEY_ID_BYTES);
            let storage_key = format!("{STORAGE_PREFIX}{key_id}");

            if self.kv.set_nx(&storage_key, &payload).await? {
                return Ok(IssuedKey {
                    key: format!("{KEY_PREFIX}{key_id}_{secret}"),
                    key_id,
                    record,
                });
            }

            log::warn!("key ID collision on issuance, retrying");
        }

        Err(AuthError::IdExhausted)
    }

    /// Load a key record by its ID.
    pub async fn lookup(&self, key_id: &str) -> Result<Option<ClientKey>, AuthError> {
        let storage_key = format!("{STORAGE_PREFIX}{key_id}");
        let Some(payload) = self.kv.get(&storage_key).await? else {
            return Ok(None);
        };

        let record = serde_json::from_str(&payload).map_err(|e| AuthError::Record(e.to_string()))?;
        Ok(Some(record))
    }

    /// Authenticate a presented key string: parse, load, verify the secret
    /// against the stored hash, and check expiry.
    pub async fn authenticate(&self, presented: &str) -> Result<ClientKey, AuthError> {
        let (key_id, secret) = parse_key(presented)?;

        let record = self.lookup(key_id).await?.ok_or(AuthError::UnknownKey)?;

        if !bcrypt::verify(secret, &record.secret_hash).map_err(|e| AuthError::Record(e.to_string()))? {
            return Err(AuthError::BadSecret);
        }

        if record.expired() {
            return Err(AuthError::Expired);
        }

        Ok(record)
    }

    /// List all key records with their IDs. Secret hashes are stripped.
    pub async fn list(&self) -> Result<Vec<(String, ClientKey)>, AuthError> {
        let keys = self.kv.scan_prefix(STORAGE_PREFIX).await?;
        let mut records = Vec::with_capacity(keys.len());

        for storage_key in keys {
            let Some(payload) = self.kv.get(&storage_key).await? else {
                continue;
            };
            let mut record: ClientKey =
                serde_json::from_str(&payload).map_err(|e| AuthError::Record(e.to_string()))?;
            record.secret_hash.clear();

            let key_id = storage_key.trim_start_matches(STORAGE_PREFIX).to_string();
            records.push((key_id, record));
        }

        records.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(records)
    }

    /// Delete a key record. Returns whether it existed.
    pub async fn revoke(&self, key_id: &str) -> Result<bool, AuthError> {
        let storage_key = format!("{STORAGE_PREFIX}{key_id}");
        Ok(self.kv.del(&storage_key).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> KeyStore {
        KeyStore::new(KvClient::in_memory())
    }

    fn issue_params() -> IssueParams {
        IssueParams {
            client_id: "acme-app".to_string(),
            client_name: "Acme App".to_string(),
            permissions: vec![Permission::Chat, Permission::Files],
            rate_limits: RateLimits { rpm: 60, tpm: 100_000 },
            tenant_id: Some("acme".to_string()),
            expires_at: None,
        }
    }

    #[test]
    fn parse_key_shapes() {
        let (id, secret) = parse_key("aibox_sk_0123456789abcdef_deadbeefdeadbeef").unwrap();
        assert_eq!(id, "0123456789abcdef");
        assert_eq!(secret, "deadbeefdeadbeef");

        // 8-char IDs stay valid after the width grows.
        assert!(parse_key("aibox_sk_01234567_secret").is_ok());

        assert!(matches!(parse_key("sk_wrong_prefix"), Err(AuthError::MalformedKey)));
        assert!(matches!(parse_key("aibox_sk_short_x"), Err(AuthError::MalformedKey)));
        assert!(matches!(parse_key("aibox_sk_0123456789abcdef"), Err(AuthError::MalformedKey)));
        assert!(matches!(parse_key("aibox_sk_nothexnothex_x"), Err(AuthError::MalformedKey)));
    }

    #[tokio::test]
    async fn issue_then_authenticate() {
        let store = store();
        let issued = store.issue(issue_params()).await.unwrap();

        assert!(issued.key.starts_with("aibox_sk_"));
        assert_eq!(issued.key_id.len(), 16);

        let record = store.authenticate(&issued.key).await.unwrap();
        assert_eq!(record.client_id, "acme-app");
        assert_eq!(record.tenant_id.as_deref(), Some("acme"));
        assert!(record.allows(Permission::Chat));
        assert!(!record.allows(Permission::Admin));
    }

    #[tokio::test]
    async fn wrong_secret_is_rejected() {
        let store = store();
        let issued = store.issue(issue_params()).await.unwrap();

        let tampered = format!("aibox_sk_{}_{}", issued.key_id, "0".repeat(32));
        assert!(matches!(store.authenticate(&tampered).await, Err(AuthError::BadSecret)));
    }

    #[tokio::test]
    async fn unknown_key_id() {
        let store = store();
        let err = store
            .authenticate("aibox_sk_0123456789abcdef_deadbeefdeadbeef")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UnknownKey));
    }

    #[tokio::test]
    async fn expired_key_is_rejected() {
        let store = store();
        let mut params = issue_params();
        params.expires_at = Some(Utc::now() - chrono::Duration::hours(1));

        let issued = store.issue(params).await.unwrap();
        assert!(matches!(store.authenticate(&issued.key).await, Err(AuthError::Expired)));
    }

    #[tokio::test]
    async fn listing_strips_secret_hash() {
        let store = store();
        store.issue(issue_params()).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].1.secret_hash.is_empty());

        // The serialized form must not carry the field at all.
        let json = serde_json::to_value(&listed[0].1).unwrap();
        assert!(json.get("secret_hash").is_none());
    }

    #[tokio::test]
    async fn revoke_deletes_the_record() {
        let store = store();
        let issued = store.issue(issue_params()).await.unwrap();

        assert!(store.revoke(&issued.key_id).await.unwrap());
        assert!(matches!(store.authenticate(&issued.key).await, Err(AuthError::UnknownKey)));
        assert!(!store.revoke(&issued.key_id).await.unwrap());
    }

    #[test]
    fn admin_implies_everything() {
        let key = ClientKey::synthetic_admin("dev");
        assert!(key.allows(Permission::Admin));
        assert!(key.allows(Permission::Chat));
        assert!(key.allows(Permission::ChatStream));
        assert!(key.allows(Permission::Files));
    }
}
