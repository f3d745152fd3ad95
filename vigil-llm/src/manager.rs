use crate::cache::ResponseCache;
use crate::config::{ChatRequest, ChatResponse, LLMConfig, Provider};
use crate::error::{LLMError, Result};
use crate::providers::{AnthropicProvider, OpenAiProvider, ProviderClient};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Shared HTTP plumbing used by both `vigil-vision` and `vigil-reasoning`.
/// Wraps a single upstream provider, enforces the call deadline, and
/// optionally caches responses by request content.
pub struct LLMManager {
    provider: Arc<dyn ProviderClient>,
    config: LLMConfig,
    cache: Option<ResponseCache>,
}

impl LLMManager {
    /// Returns `None` when no API key is configured for the requested
    /// provider — callers (notably `ReasoningClient`) treat an absent
    /// manager as "this call site is permanently unavailable" rather than
    /// retrying a call that can never succeed.
    pub fn new(config: LLMConfig, api_key: Option<String>) -> Option<Self> {
        let api_key = api_key?;
        if api_key.trim().is_empty() {
            return None;
        }
        let provider: Arc<dyn ProviderClient> = match config.provider {
            Provider::Anthropic => Arc::new(AnthropicProvider::new(api_key)),
            Provider::OpenAI => Arc::new(OpenAiProvider::new(api_key)),
        };
        let cache = config
            .enable_caching
            .then(|| ResponseCache::new(config.cache_capacity));
        Some(Self {
            provider,
            config,
            cache,
        })
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Issue one chat call, bounded by `call_deadline_secs`. A timed-out call
    /// is surfaced as `LLMError::Timeout`, which callers treat identically to
    /// a transient remote failure (skip this tick, never fatal).
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let cache_key = self.cache.as_ref().map(|_| cache_key(&request));
        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(cached) = cache.get(key) {
                debug!(provider = self.provider.name(), "llm cache hit");
                return serde_json::from_str(&cached).map_err(LLMError::Json);
            }
        }

        let deadline = Duration::from_secs(self.config.call_deadline_secs);
        let result = tokio::time::timeout(deadline, self.provider.chat(request)).await;

        let response = match result {
            Ok(inner) => inner?,
            Err(_) => {
                warn!(provider = self.provider.name(), "llm call exceeded deadline");
                return Err(LLMError::Timeout);
            }
        };

        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Ok(serialized) = serde_json::to_string(&response) {
                cache.set(key, serialized, self.config.cache_ttl_seconds);
            }
        }

        Ok(response)
    }
}

fn cache_key(request: &ChatRequest) -> String {
    serde_json::to_string(request).unwrap_or_default()
}
