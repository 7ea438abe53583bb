//! In-process KV backend for development mode and tests.
//!
//! Implements the same contract as the Redis backend, including the
//! window-increment script semantics: all multi-step operations run under
//! one lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug, Clone)]
enum Value {
    String(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory KV store with TTL bookkeeping.
#[derive(Clone, Default)]
pub struct MemoryKv {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryKv {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_live_entry<T>(&self, key: &str, f: impl FnOnce(Option<&mut Entry>) -> T) -> T {
        let mut entries = self.entries.lock();

        if entries.get(key).is_some_and(Entry::expired) {
            entries.remove(key);
        }

        f(entries.get_mut(key))
    }

    pub(crate) fn get(&self, key: &str) -> Option<String> {
        self.with_live_entry(key, |entry| match entry {
            Some(Entry {
                value: Value::String(s),
                ..
            }) => Some(s.clone()),
            _ => None,
        })
    }

    pub(crate) fn set(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let mut entries = self.entries.lock();
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::String(value.to_string()),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
    }

    pub(crate) fn set_nx(&self, key: &str, value: &str) -> bool {
        let mut entries = self.entries.lock();

        if entries.get(key).is_some_and(Entry::expired) {
            entries.remove(key);
        }

        if entries.contains_key(key) {
            return false;
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: Value::String(value.to_string()),
                expires_at: None,
            },
        );
        true
    }

    pub(crate) fn del(&self, key: &str) -> bool {
        let mut entries = self.entries.lock();
        let existed = entries.remove(key).is_some_and(|e| !e.expired());
        existed
    }

    pub(crate) fn exists(&self, key: &str) -> bool {
        self.with_live_entry(key, |entry| entry.is_some())
    }

    pub(crate) fn hset(&self, key: &str, field: &str, value: &str) {
        let mut entries = self.entries.lock();

        if entries.get(key).is_some_and(Entry::expired) {
            entries.remove(key);
        }

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Hash(HashMap::new()),
            expires_at: None,
        });

        if let Value::Hash(hash) = &mut entry.value {
            hash.insert(field.to_string(), value.to_string());
        }
    }

    pub(crate) fn hgetall(&self, key: &str) -> HashMap<String, String> {
        self.with_live_entry(key, |entry| match entry {
            Some(Entry {
                value: Value::Hash(hash),
                ..
            }) => hash.clone(),
            _ => HashMap::new(),
        })
    }

    pub(crate) fn hdel(&self, key: &str, field: &str) -> bool {
        self.with_live_entry(key, |entry| match entry {
            Some(Entry {
                value: Value::Hash(hash),
                ..
            }) => hash.remove(field).is_some(),
            _ => false,
        })
    }

    pub(crate) fn scan_prefix(&self, prefix: &str) -> Vec<String> {
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| !entry.expired());
        entries.keys().filter(|k| k.starts_with(prefix)).cloned().collect()
    }

    pub(crate) fn window_incr(&self, key: &str, amount: i64, window: Duration) -> i64 {
        let mut entries = self.entries.lock();

        if entries.get(key).is_some_and(Entry::expired) {
            entries.remove(key);
        }

        match entries.get_mut(key) {
            Some(entry) => {
                let current = match &entry.value {
                    Value::String(s) => s.parse::<i64>().unwrap_or(0),
                    Value::Hash(_) => 0,
                };
                let next = current + amount;
                entry.value = Value::String(next.to_string());
                if entry.expires_at.is_none() {
                    entry.expires_at = Some(Instant::now() + window);
                }
                next
            }
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::String(amount.to_string()),
                        expires_at: Some(Instant::now() + window),
                    },
                );
                amount
            }
        }
    }

    pub(crate) fn ttl(&self, key: &str) -> Option<i64> {
        self.with_live_entry(key, |entry| {
            entry
                .and_then(|e| e.expires_at)
                .map(|at| at.saturating_duration_since(Instant::now()).as_secs() as i64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_del() {
        let kv = MemoryKv::new();
        assert!(kv.get("k").is_none());

        kv.set("k", "v", None);
        assert_eq!(kv.get("k").as_deref(), Some("v"));
        assert!(kv.exists("k"));

        assert!(kv.del("k"));
        assert!(!kv.del("k"));
        assert!(kv.get("k").is_none());
    }

    #[test]
    fn ttl_expiry() {
        let kv = MemoryKv::new();
        kv.set("k", "v", Some(Duration::from_millis(5)));
        assert!(kv.exists("k"));

        std::thread::sleep(Duration::from_millis(20));
        assert!(!kv.exists("k"));
        assert!(kv.get("k").is_none());
    }

    #[test]
    fn set_nx_only_first_wins() {
        let kv = MemoryKv::new();
        assert!(kv.set_nx("k", "first"));
        assert!(!kv.set_nx("k", "second"));
        assert_eq!(kv.get("k").as_deref(), Some("first"));
    }

    #[test]
    fn hash_ops() {
        let kv = MemoryKv::new();
        kv.hset("h", "a", "1");
        kv.hset("h", "b", "2");

        let all = kv.hgetall("h");
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("a").map(String::as_str), Some("1"));

        assert!(kv.hdel("h", "a"));
        assert!(!kv.hdel("h", "a"));
        assert_eq!(kv.hgetall("h").len(), 1);
    }

    #[test]
    fn window_incr_sets_ttl_once() {
        let kv = MemoryKv::new();

        assert_eq!(kv.window_incr("c", 1, Duration::from_secs(60)), 1);
        let first_ttl = kv.ttl("c").unwrap();
        assert!(first_ttl > 0);

        assert_eq!(kv.window_incr("c", 2, Duration::from_secs(60)), 3);
        // Second increment must not re-arm the window.
        assert!(kv.ttl("c").unwrap() <= first_ttl);
    }

    #[test]
    fn window_incr_resets_after_expiry() {
        let kv = MemoryKv::new();
        kv.window_incr("c", 5, Duration::from_millis(5));

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(kv.window_incr("c", 1, Duration::from_secs(60)), 1);
    }

    #[test]
    fn scan_prefix_filters() {
        let kv = MemoryKv::new();
        kv.set("aibox:key:1", "a", None);
        kv.set("aibox:key:2", "b", None);
        kv.set("other", "c", None);

        let mut keys = kv.scan_prefix("aibox:key:");
        keys.sort();
        assert_eq!(keys, vec!["aibox:key:1", "aibox:key:2"]);
    }
}
