//! Copy-on-write tenant snapshot manager.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::{TenantConfig, normalize_tenant_id};
use crate::loader::load_tenants;
use crate::secrets::SecretResolver;
use crate::TenantError;

type Snapshot = Arc<HashMap<String, Arc<TenantConfig>>>;

/// Result of a reload: which tenants appeared, disappeared, changed, or
/// stayed identical.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ReloadDiff {
    /// Tenants present after but not before.
    pub added: Vec<String>,
    /// Tenants present before but not after.
    pub removed: Vec<String>,
    /// Tenants whose configuration differs.
    pub changed: Vec<String>,
    /// Tenants whose configuration is identical.
    pub unchanged: Vec<String>,
}

/// Holds the published tenant snapshot and serves lookups.
///
/// Readers clone an `Arc` to the current snapshot; reload builds a whole
/// new map and swaps the pointer, so in-flight requests keep whichever
/// snapshot they started with.
pub struct TenantManager {
    configs_dir: PathBuf,
    resolver: SecretResolver,
    snapshot: RwLock<Snapshot>,
}

impl TenantManager {
    /// Load all tenants from `configs_dir` and publish the first snapshot.
    pub async fn load(configs_dir: PathBuf) -> Result<Self, TenantError> {
        let resolver = SecretResolver::default();
        let configs = load_tenants(&configs_dir, &resolver).await?;

        log::info!("loaded {} tenant configs from {}", configs.len(), configs_dir.display());

        Ok(Self {
            configs_dir,
            resolver,
            snapshot: RwLock::new(Arc::new(configs)),
        })
    }

    /// A manager with an empty snapshot. Development-mode fallback when
    /// the configs directory is absent; `reload` picks tenants up once
    /// the directory appears.
    pub fn empty(configs_dir: PathBuf) -> Self {
        Self {
            configs_dir,
            resolver: SecretResolver::default(),
            snapshot: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Look up a tenant by (normalized) ID in the current snapshot.
    pub fn get(&self, tenant_id: &str) -> Option<Arc<TenantConfig>> {
        let normalized = normalize_tenant_id(tenant_id);
        self.snapshot.read().get(&normalized).cloned()
    }

    /// All tenant IDs in the current snapshot, sorted.
    pub fn tenant_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.snapshot.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of tenants in the current snapshot.
    pub fn len(&self) -> usize {
        self.snapshot.read().len()
    }

    /// Whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.snapshot.read().is_empty()
    }

    /// Re-read the configs directory and atomically publish the result.
    ///
    /// Nothing is swapped until the whole directory has loaded and
    /// validated; a bad file leaves the old snapshot serving.
    pub async fn reload(&self) -> Result<ReloadDiff, TenantError> {
        let next = load_tenants(&self.configs_dir, &self.resolver).await?;
        let next: Snapshot = Arc::new(next);

        let previous = {
            let mut guard = self.snapshot.write();
            std::mem::replace(&mut *guard, next.clone())
        };

        let mut diff = ReloadDiff::default();

        for (id, config) in next.iter() {
            match previous.get(id) {
                None => diff.added.push(id.clone()),
                Some(old) if **old == **config => diff.unchanged.push(id.clone()),
                Some(_) => diff.changed.push(id.clone()),
            }
        }
        for id in previous.keys() {
            if !next.contains_key(id) {
                diff.removed.push(id.clone());
            }
        }

        diff.added.sort();
        diff.removed.sort();
        diff.changed.sort();
        diff.unchanged.sort();

        log::info!(
            "tenant reload: {} added, {} removed, {} changed, {} unchanged",
            diff.added.len(),
            diff.removed.len(),
            diff.changed.len(),
            diff.unchanged.len()
        );

        Ok(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_tenant(dir: &TempDir, file: &str, tenant_id: &str, model: &str) {
        let contents = format!(
            r#"{{"tenant_id":"{tenant_id}","providers":{{"openai":{{"enabled":true,"api_key":"k","model":"{model}"}}}}}}"#
        );
        let mut f = std::fs::File::create(dir.path().join(file)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn lookup_normalizes() {
        let dir = TempDir::new().unwrap();
        write_tenant(&dir, "acme.json", "acme", "gpt-4o");

        let manager = TenantManager::load(dir.path().to_path_buf()).await.unwrap();

        assert!(manager.get("acme").is_some());
        assert!(manager.get("  ACME ").is_some());
        assert!(manager.get("globex").is_none());
    }

    #[tokio::test]
    async fn reload_diff() {
        let dir = TempDir::new().unwrap();
        write_tenant(&dir, "acme.json", "acme", "gpt-4o");
        write_tenant(&dir, "globex.json", "globex", "gpt-4o");

        let manager = TenantManager::load(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(manager.len(), 2);

        // globex changes model, initech appears, acme stays put.
        write_tenant(&dir, "globex.json", "globex", "gpt-4o-mini");
        write_tenant(&dir, "initech.json", "initech", "gpt-4o");

        let diff = manager.reload().await.unwrap();
        assert_eq!(diff.added, vec!["initech"]);
        assert_eq!(diff.changed, vec!["globex"]);
        assert_eq!(diff.unchanged, vec!["acme"]);
        assert!(diff.removed.is_empty());

        std::fs::remove_file(dir.path().join("initech.json")).unwrap();
        let diff = manager.reload().await.unwrap();
        assert_eq!(diff.removed, vec!["initech"]);
    }

    #[tokio::test]
    async fn failed_reload_keeps_old_snapshot() {
        let dir = TempDir::new().unwrap();
        write_tenant(&dir, "acme.json", "acme", "gpt-4o");

        let manager = TenantManager::load(dir.path().to_path_buf()).await.unwrap();

        // Corrupt the directory: the reload must fail and leave the
        // previous snapshot serving.
        std::fs::write(dir.path().join("acme.json"), "{broken").unwrap();
        assert!(manager.reload().await.is_err());
        assert!(manager.get("acme").is_some());
    }
}
