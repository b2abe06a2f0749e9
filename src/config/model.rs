use anyhow::{Result, anyhow};

use super::environment::env_string;
use super::types::{Config, LlmProvider};

/// A model identifier, optionally prefixed with its provider.
///
/// Accepts `groq:qwen/qwen3-32b` and `groq/qwen/qwen3-32b`. A prefix that is
/// not a known provider is part of the model name (`qwen/qwen3-32b`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub provider: Option<LlmProvider>,
    pub name: String,
}

impl ModelRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(anyhow!("Model identifier cannot be empty"));
        }

        for separator in [':', '/'] {
            if let Some((prefix, rest)) = raw.split_once(separator) {
                if let Ok(provider) = prefix.parse::<LlmProvider>() {
                    if rest.trim().is_empty() {
                        return Err(anyhow!("Model identifier '{raw}' is missing a model name"));
                    }
                    return Ok(Self {
                        provider: Some(provider),
                        name: rest.trim().to_string(),
                    });
                }
            }
        }

        Ok(Self {
            provider: None,
            name: raw.to_string(),
        })
    }
}

impl Config {
    /// Copy of this configuration pointed at `model`.
    ///
    /// When the model names a different provider, the base URL is reset and
    /// the api key is read from that provider's environment variable.
    pub fn for_model(&self, model: &str) -> Result<Config> {
        let model = ModelRef::parse(model)?;
        let mut config = self.clone();
        config.models.model = model.name;

        if let Some(provider) = model.provider {
            if provider != config.llm.provider {
                let key_var = provider.api_key_env_var();
                let api_key = env_string(key_var)?.ok_or_else(|| {
                    anyhow!(
                        "{} API key not found. Set {}",
                        provider.display_name(),
                        key_var
                    )
                })?;
                config.llm.provider = provider;
                config.llm.base_url = provider.default_base_url().to_string();
                config.llm.api_key = api_key;
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_colon_prefix() {
        let model = ModelRef::parse("groq:qwen/qwen3-32b").unwrap();
        assert_eq!(model.provider, Some(LlmProvider::Groq));
        assert_eq!(model.name, "qwen/qwen3-32b");
    }

    #[test]
    fn parse_accepts_slash_prefix() {
        let model = ModelRef::parse("groq/qwen/qwen3-32b").unwrap();
        assert_eq!(model.provider, Some(LlmProvider::Groq));
        assert_eq!(model.name, "qwen/qwen3-32b");
    }

    #[test]
    fn parse_keeps_unknown_prefix_in_name() {
        let model = ModelRef::parse("qwen/qwen3-32b").unwrap();
        assert_eq!(model.provider, None);
        assert_eq!(model.name, "qwen/qwen3-32b");
    }

    #[test]
    fn parse_rejects_empty_names() {
        assert!(ModelRef::parse("  ").is_err());
        assert!(ModelRef::parse("groq:").is_err());
    }

    #[test]
    fn for_model_on_same_provider_only_changes_model() {
        let config = Config::builder()
            .with_llm(|llm| llm.api_key = "key".to_string())
            .build()
            .unwrap();

        let updated = config.for_model("groq:llama-3.3-70b-versatile").unwrap();
        assert_eq!(updated.models.model, "llama-3.3-70b-versatile");
        assert_eq!(updated.llm.api_key, "key");
        assert_eq!(config.models.model, crate::config::DEFAULT_MODEL);
    }
}
