//! Name → adapter lookup.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::provider::anthropic::AnthropicProvider;
use crate::provider::gemini::GeminiProvider;
use crate::provider::openai::OpenAiProvider;
use crate::Provider;

/// Holds one adapter instance per supported upstream.
///
/// Adapters are stateless apart from their HTTP client; per-request
/// credentials and knobs travel in `GenerateParams.config`.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<&'static str, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Construct every adapter.
    pub fn new() -> crate::Result<Self> {
        let mut providers: BTreeMap<&'static str, Arc<dyn Provider>> = BTreeMap::new();

        let openai = Arc::new(OpenAiProvider::new()?);
        providers.insert(openai.name(), openai);

        let anthropic = Arc::new(AnthropicProvider::new()?);
        providers.insert(anthropic.name(), anthropic);

        let gemini = Arc::new(GeminiProvider::new()?);
        providers.insert(gemini.name(), gemini);

        Ok(Self { providers })
    }

    /// Build a registry from explicit adapters. Used by tests and by
    /// deployments that compile in a subset of upstreams.
    pub fn with_providers(adapters: Vec<Arc<dyn Provider>>) -> Self {
        let mut providers: BTreeMap<&'static str, Arc<dyn Provider>> = BTreeMap::new();
        for adapter in adapters {
            providers.insert(adapter.name(), adapter);
        }
        Self { providers }
    }

    /// Look up an adapter by provider name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Names of all registered adapters, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        self.providers.keys().copied().collect()
    }
}
