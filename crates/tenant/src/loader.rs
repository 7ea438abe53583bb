//! Directory loader for tenant configuration files.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use crate::config::{TenantConfig, normalize_tenant_id};
use crate::secrets::SecretResolver;
use crate::TenantError;

/// Load every tenant config under `dir`.
///
/// Files ending in `.json`, `.yaml`, or `.yml` are decoded; files without
/// a `tenant_id` are silently skipped (reserved for shared snippets).
/// Tenant IDs are normalized, duplicates are an error, secrets are
/// resolved, provider base URLs pass the SSRF guard, and every config is
/// validated before anything is returned.
pub async fn load_tenants(
    dir: &Path,
    resolver: &SecretResolver,
) -> Result<HashMap<String, Arc<TenantConfig>>, TenantError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| TenantError::Directory(dir.display().to_string(), e))?;

    let mut configs: HashMap<String, Arc<TenantConfig>> = HashMap::new();

    for entry in entries {
        let entry = entry.map_err(|e| TenantError::Directory(dir.display().to_string(), e))?;
        let path = entry.path();

        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };

        let file_name = path.display().to_string();
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| TenantError::Directory(file_name.clone(), e))?;

        let mut config: TenantConfig = match ext {
            "json" => serde_json::from_str(&contents).map_err(|e| TenantError::Parse {
                file: file_name.clone(),
                message: e.to_string(),
            })?,
            "yaml" | "yml" => serde_yaml::from_str(&contents).map_err(|e| TenantError::Parse {
                file: file_name.clone(),
                message: e.to_string(),
            })?,
            _ => continue,
        };

        if config.tenant_id.trim().is_empty() {
            log::debug!("skipping {file_name}: no tenant_id");
            continue;
        }

        config.tenant_id = normalize_tenant_id(&config.tenant_id);

        if configs.contains_key(&config.tenant_id) {
            return Err(TenantError::DuplicateTenant(config.tenant_id));
        }

        resolve_secrets(&mut config, resolver)?;

        config.validate().map_err(|message| TenantError::Invalid {
            tenant: config.tenant_id.clone(),
            message,
        })?;

        validate_base_urls(&config).await?;

        configs.insert(config.tenant_id.clone(), Arc::new(config));
    }

    if configs.is_empty() {
        return Err(TenantError::Empty(dir.display().to_string()));
    }

    Ok(configs)
}

fn resolve_secrets(config: &mut TenantConfig, resolver: &SecretResolver) -> Result<(), TenantError> {
    for (name, provider) in &mut config.providers {
        let resolved =
            resolver
                .resolve(provider.api_key.expose_secret())
                .map_err(|message| TenantError::Secret {
                    tenant: config.tenant_id.clone(),
                    provider: name.clone(),
                    message,
                })?;
        provider.api_key = SecretString::from(resolved);
    }
    Ok(())
}

async fn validate_base_urls(config: &TenantConfig) -> Result<(), TenantError> {
    for (name, provider) in &config.providers {
        if !provider.enabled {
            continue;
        }
        if let Some(base_url) = &provider.base_url {
            url_guard::validate_url(base_url)
                .await
                .map_err(|e| TenantError::Invalid {
                    tenant: config.tenant_id.clone(),
                    message: format!("provider '{name}' base_url: {e}"),
                })?;
        }
    }
    Ok(())
}
