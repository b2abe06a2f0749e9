use anyhow::Result;

use super::types::{Config, LlmProvider, LlmSettings, ModelSettings};

/// Accumulates the configuration layers in order: defaults, the
/// `~/.agent-adapter/config` file, then environment variables. Each layer
/// only touches the settings it actually names.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    pub(super) llm: LlmSettings,
    pub(super) models: ModelSettings,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches provider and resets the base URL to that provider's default.
    /// The api key is left alone; the layer that sets the provider is
    /// expected to supply the matching key.
    pub fn with_provider(self, provider: LlmProvider) -> Self {
        self.with_llm(|llm| {
            if llm.provider != provider {
                llm.provider = provider;
                llm.base_url = provider.default_base_url().to_string();
            }
        })
    }

    /// Endpoint settings: key, base URL, timeout, user agent.
    pub fn with_llm(mut self, update: impl FnOnce(&mut LlmSettings)) -> Self {
        update(&mut self.llm);
        self
    }

    /// Per-request model settings shared by both adapters.
    pub fn with_models(mut self, update: impl FnOnce(&mut ModelSettings)) -> Self {
        update(&mut self.models);
        self
    }

    /// Unvalidated result; see [`Config::validate`].
    pub fn build(self) -> Result<Config> {
        let ConfigBuilder { llm, models } = self;
        Ok(Config { llm, models })
    }
}
