//! Tenant configuration model and validation.

use std::collections::{BTreeMap, HashMap};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

const MAX_TENANT_ID_LEN: usize = 64;
const MAX_OUTPUT_TOKENS_CEILING: u32 = 131_072;

/// Trim and lowercase a tenant ID. Lookups and load paths must apply the
/// same normalization or case differences split a tenant in two.
pub fn normalize_tenant_id(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// Validate a tenant or store identifier: lowercase alphanumeric start,
/// then alphanumerics, underscores, and dashes, at most 64 chars.
pub fn validate_id(id: &str) -> bool {
    if id.is_empty() || id.len() > MAX_TENANT_ID_LEN {
        return false;
    }

    let mut chars = id.bytes();
    let first = chars.next().unwrap_or(b'_');
    if !(first.is_ascii_lowercase() || first.is_ascii_digit()) {
        return false;
    }

    chars.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
}

/// One upstream provider as configured for a tenant.
///
/// Values in a published snapshot are never mutated; per-request overrides
/// clone the whole struct, including a fresh `extra_options` map.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Whether requests may be dispatched to this provider.
    #[serde(default)]
    pub enabled: bool,
    /// API key, resolved from `ENV=`, `FILE=`, `${VAR}`, or inline.
    #[serde(default = "empty_secret")]
    pub api_key: SecretString,
    /// Upstream model identifier.
    #[serde(default)]
    pub model: String,
    /// Optional custom base URL; must pass SSRF validation.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Sampling temperature in [0, 2].
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Nucleus sampling in [0, 1].
    #[serde(default)]
    pub top_p: Option<f64>,
    /// Output token cap in [1, 131072].
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    /// Provider-specific pass-through options.
    #[serde(default)]
    pub extra_options: HashMap<String, String>,
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: empty_secret(),
            model: String::new(),
            base_url: None,
            temperature: None,
            top_p: None,
            max_output_tokens: None,
            extra_options: HashMap::new(),
        }
    }
}

impl PartialEq for ProviderConfig {
    fn eq(&self, other: &Self) -> bool {
        self.enabled == other.enabled
            && self.api_key.expose_secret() == other.api_key.expose_secret()
            && self.model == other.model
            && self.base_url == other.base_url
            && self.temperature == other.temperature
            && self.top_p == other.top_p
            && self.max_output_tokens == other.max_output_tokens
            && self.extra_options == other.extra_options
    }
}

/// Failover behavior for a tenant.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FailoverConfig {
    /// Whether automatic failover is on.
    #[serde(default)]
    pub enabled: bool,
    /// Preference-ordered provider names.
    #[serde(default)]
    pub order: Vec<String>,
}

/// Tenant-level RAG knobs.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TenantRagConfig {
    /// Whether RAG retrieval is allowed for this tenant.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Override for the retrieval result count.
    #[serde(default)]
    pub top_k: Option<usize>,
}

fn default_true() -> bool {
    true
}

/// A tenant's full configuration as published in a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TenantConfig {
    /// Normalized tenant identifier.
    #[serde(default)]
    pub tenant_id: String,
    /// Configured providers by name. BTreeMap keeps iteration (and
    /// therefore default-provider selection) deterministic.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    /// Failover behavior.
    #[serde(default)]
    pub failover: FailoverConfig,
    /// Optional RAG knobs.
    #[serde(default)]
    pub rag: Option<TenantRagConfig>,
}

impl TenantConfig {
    /// Look up a provider, returning it only when enabled.
    pub fn get_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name).filter(|p| p.enabled)
    }

    /// The provider used when the request names none: the first enabled
    /// entry in the failover order, else the first enabled provider in
    /// name order.
    pub fn default_provider(&self) -> Option<(&str, &ProviderConfig)> {
        for name in &self.failover.order {
            if let Some(config) = self.get_provider(name) {
                return Some((name.as_str(), config));
            }
        }

        self.providers
            .iter()
            .find(|(_, config)| config.enabled)
            .map(|(name, config)| (name.as_str(), config))
    }

    /// The next enabled provider in the failover order after `current`.
    /// When `current` is not in the order, the first enabled entry other
    /// than `current` wins.
    pub fn next_failover(&self, current: &str) -> Option<(&str, &ProviderConfig)> {
        let in_order = self.failover.order.iter().any(|n| n == current);
        let mut past_current = !in_order;

        for name in &self.failover.order {
            if name == current {
                past_current = true;
                continue;
            }
            if past_current && let Some(config) = self.get_provider(name) {
                return Some((name.as_str(), config));
            }
        }

        None
    }

    /// Semantic validation, applied after secret resolution.
    pub fn validate(&self) -> Result<(), String> {
        if self.tenant_id.is_empty() {
            return Err("tenant_id is required".to_string());
        }
        if !validate_id(&self.tenant_id) {
            return Err(format!("invalid tenant_id '{}'", self.tenant_id));
        }

        if !self.providers.values().any(|p| p.enabled) {
            return Err("no enabled providers".to_string());
        }

        for (name, provider) in &self.providers {
            if !provider.enabled {
                continue;
            }

            if provider.api_key.expose_secret().is_empty() {
                return Err(format!("provider '{name}' has no api_key"));
            }
            if provider.model.is_empty() {
                return Err(format!("provider '{name}' has no model"));
            }

            if let Some(t) = provider.temperature
                && !(0.0..=2.0).contains(&t)
            {
                return Err(format!("provider '{name}' temperature {t} out of [0, 2]"));
            }
            if let Some(p) = provider.top_p
                && !(0.0..=1.0).contains(&p)
            {
                return Err(format!("provider '{name}' top_p {p} out of [0, 1]"));
            }
            if let Some(m) = provider.max_output_tokens
                && !(1..=MAX_OUTPUT_TOKENS_CEILING).contains(&m)
            {
                return Err(format!("provider '{name}' max_output_tokens {m} out of [1, 131072]"));
            }
        }

        for name in &self.failover.order {
            if !self.providers.contains_key(name) {
                return Err(format!("failover order names unknown provider '{name}'"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(enabled: bool) -> ProviderConfig {
        ProviderConfig {
            enabled,
            api_key: SecretString::from("key".to_string()),
            model: "gpt-4o".to_string(),
            ..ProviderConfig::default()
        }
    }

    fn base_config() -> TenantConfig {
        TenantConfig {
            tenant_id: "tenant".to_string(),
            providers: BTreeMap::from([("openai".to_string(), provider(true))]),
            ..TenantConfig::default()
        }
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize_tenant_id("  ACME "), "acme");
        assert_eq!(normalize_tenant_id("Acme-Corp"), "acme-corp");
    }

    #[test]
    fn id_pattern() {
        assert!(validate_id("acme"));
        assert!(validate_id("acme-corp_2"));
        assert!(validate_id("0tenant"));

        assert!(!validate_id(""));
        assert!(!validate_id("-acme"));
        assert!(!validate_id("_acme"));
        assert!(!validate_id("Acme"));
        assert!(!validate_id("acme corp"));
        assert!(!validate_id(&"x".repeat(65)));
    }

    #[test]
    fn get_provider_requires_enabled() {
        let mut config = base_config();
        config.providers.insert("gemini".to_string(), provider(false));

        assert!(config.get_provider("openai").is_some());
        assert!(config.get_provider("gemini").is_none());
        assert!(config.get_provider("unknown").is_none());
    }

    #[test]
    fn default_provider_prefers_failover_order() {
        let mut config = base_config();
        config.providers.insert("gemini".to_string(), provider(true));
        config.failover = FailoverConfig {
            enabled: true,
            order: vec!["gemini".to_string(), "openai".to_string()],
        };

        let (name, _) = config.default_provider().unwrap();
        assert_eq!(name, "gemini");
    }

    #[test]
    fn default_provider_skips_disabled_order_entries() {
        let mut config = base_config();
        config.providers.insert("gemini".to_string(), provider(false));
        config.failover = FailoverConfig {
            enabled: true,
            order: vec!["gemini".to_string(), "openai".to_string()],
        };

        let (name, _) = config.default_provider().unwrap();
        assert_eq!(name, "openai");
    }

    #[test]
    fn default_provider_deterministic_without_order() {
        let mut config = base_config();
        config.providers.insert("anthropic".to_string(), provider(true));

        // BTreeMap order: anthropic before openai.
        let (name, _) = config.default_provider().unwrap();
        assert_eq!(name, "anthropic");
    }

    #[test]
    fn next_failover_walks_order() {
        let mut config = base_config();
        config.providers.insert("gemini".to_string(), provider(true));
        config.providers.insert("anthropic".to_string(), provider(true));
        config.failover = FailoverConfig {
            enabled: true,
            order: vec![
                "openai".to_string(),
                "gemini".to_string(),
                "anthropic".to_string(),
            ],
        };

        let (name, _) = config.next_failover("openai").unwrap();
        assert_eq!(name, "gemini");

        let (name, _) = config.next_failover("gemini").unwrap();
        assert_eq!(name, "anthropic");

        assert!(config.next_failover("anthropic").is_none());
    }

    #[test]
    fn next_failover_skips_disabled() {
        let mut config = base_config();
        config.providers.insert("gemini".to_string(), provider(false));
        config.providers.insert("anthropic".to_string(), provider(true));
        config.failover = FailoverConfig {
            enabled: true,
            order: vec![
                "openai".to_string(),
                "gemini".to_string(),
                "anthropic".to_string(),
            ],
        };

        let (name, _) = config.next_failover("openai").unwrap();
        assert_eq!(name, "anthropic");
    }

    #[test]
    fn validation_matrix() {
        let cases: Vec<(&str, Box<dyn Fn(&mut TenantConfig)>, bool)> = vec![
            ("valid", Box::new(|_| {}), true),
            ("missing tenant id", Box::new(|c| c.tenant_id.clear()), false),
            (
                "long tenant id",
                Box::new(|c| c.tenant_id = "x".repeat(65)),
                false,
            ),
            (
                "no enabled provider",
                Box::new(|c| c.providers.get_mut("openai").unwrap().enabled = false),
                false,
            ),
            (
                "missing api key",
                Box::new(|c| {
                    c.providers.get_mut("openai").unwrap().api_key = SecretString::from(String::new())
                }),
                false,
            ),
            (
                "missing model",
                Box::new(|c| c.providers.get_mut("openai").unwrap().model.clear()),
                false,
            ),
            (
                "temperature too high",
                Box::new(|c| c.providers.get_mut("openai").unwrap().temperature = Some(3.0)),
                false,
            ),
            (
                "temperature too low",
                Box::new(|c| c.providers.get_mut("openai").unwrap().temperature = Some(-0.5)),
                false,
            ),
            (
                "top_p too high",
                Box::new(|c| c.providers.get_mut("openai").unwrap().top_p = Some(1.5)),
                false,
            ),
            (
                "max_output_tokens zero",
                Box::new(|c| c.providers.get_mut("openai").unwrap().max_output_tokens = Some(0)),
                false,
            ),
            (
                "max_output_tokens too high",
                Box::new(|c| c.providers.get_mut("openai").unwrap().max_output_tokens = Some(200_000)),
                false,
            ),
            (
                "unknown failover provider",
                Box::new(|c| {
                    c.failover = FailoverConfig {
                        enabled: true,
                        order: vec!["missing".to_string()],
                    }
                }),
                false,
            ),
            (
                "valid knobs",
                Box::new(|c| {
                    let p = c.providers.get_mut("openai").unwrap();
                    p.temperature = Some(0.7);
                    p.top_p = Some(0.9);
                    p.max_output_tokens = Some(4096);
                }),
                true,
            ),
            (
                "valid failover",
                Box::new(|c| {
                    c.failover = FailoverConfig {
                        enabled: true,
                        order: vec!["openai".to_string()],
                    }
                }),
                true,
            ),
        ];

        for (name, mutate, ok) in cases {
            let mut config = base_config();
            mutate(&mut config);
            assert_eq!(config.validate().is_ok(), ok, "case '{name}'");
        }
    }
}
