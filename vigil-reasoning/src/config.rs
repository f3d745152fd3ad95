use vigil_llm::Provider;

#[derive(Debug, Clone)]
pub struct ReasoningConfig {
    pub provider: Provider,
    pub model: String,
    pub call_deadline_secs: u64,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Anthropic,
            model: "claude-3-haiku-20240307".to_string(),
            call_deadline_secs: 20,
        }
    }
}

impl ReasoningConfig {
    /// Overlays `REASONING_MODEL`/`REASONING_PROVIDER` on top of the defaults,
    /// same pattern as `VigilConfig::from_env`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            provider: std::env::var("REASONING_PROVIDER")
                .ok()
                .and_then(|v| Provider::from_str(&v))
                .unwrap_or(defaults.provider),
            model: std::env::var("REASONING_MODEL").unwrap_or(defaults.model),
            ..defaults
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.call_deadline_secs == 0 {
            return Err("call_deadline_secs must be > 0".to_string());
        }
        Ok(())
    }
}
