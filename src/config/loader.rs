use anyhow::{Context, Result};
use dirs::home_dir;
use std::{fs, path::Path};

use super::Config;
use super::builder::ConfigBuilder;
use super::environment::apply_env_overrides;
use super::types::{FileConfig, LlmProvider};
use super::validation::validate;

impl Config {
    pub fn config_path() -> Result<std::path::PathBuf> {
        let mut path = home_dir().context("Could not determine home directory")?;
        path.push(".agent-adapter/config");
        Ok(path)
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Defaults, then `~/.agent-adapter/config`, then environment variables.
    pub fn load() -> Result<Self> {
        let config = Self::load_unchecked()?;
        validate(&config)?;
        Ok(config)
    }

    /// Same layering as [`Config::load`] without [`Config::validate`], for
    /// callers that still switch model or provider before checking.
    pub fn load_unchecked() -> Result<Self> {
        let path = Self::config_path()?;
        let mut builder = ConfigBuilder::new();

        if path.exists() {
            builder = Self::apply_file(builder, &path)?;
        }

        builder = apply_env_overrides(builder)?;

        builder.build()
    }

    pub fn validate(&self) -> Result<()> {
        validate(self)
    }

    fn apply_file(builder: ConfigBuilder, path: &Path) -> Result<ConfigBuilder> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed reading config at {}", path.display()))?;

        if contents.trim().is_empty() {
            return Ok(builder);
        }

        let file: FileConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed parsing JSON config at {}", path.display()))?;

        file.apply(builder)
    }
}

impl FileConfig {
    pub fn apply(self, mut builder: ConfigBuilder) -> Result<ConfigBuilder> {
        let FileConfig { llm, models } = self;

        if let Some(provider) = llm.provider.as_deref() {
            let parsed = provider
                .parse::<LlmProvider>()
                .with_context(|| format!("Invalid provider '{provider}' in config file"))?;
            builder = builder.with_provider(parsed);
        }

        let builder = builder.with_llm(|settings| {
            if let Some(api_key) = llm.api_key {
                settings.api_key = api_key;
            }
            if let Some(timeout) = llm.timeout_secs {
                settings.timeout_secs = timeout;
            }
            if let Some(base_url) = llm.base_url {
                settings.base_url = base_url;
            }
            if let Some(user_agent) = llm.user_agent {
                settings.user_agent = user_agent;
            }
        });

        Ok(builder.with_models(|settings| {
            if let Some(model) = models.model {
                settings.model = model;
            }
            if let Some(max_tokens) = models.max_tokens {
                settings.max_tokens = max_tokens;
            }
            if let Some(temperature) = models.temperature {
                settings.temperature = temperature;
            }
        }))
    }
}
