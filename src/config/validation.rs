use anyhow::{Result, anyhow, bail};

use super::types::Config;

pub fn validate(config: &Config) -> Result<()> {
    if config.llm.api_key.trim().is_empty() {
        let provider = config.llm.provider;
        return Err(anyhow!(
            "{} API key not found. Set {} or add it to {}",
            provider.display_name(),
            provider.api_key_env_var(),
            Config::config_path()?.display()
        ));
    }

    if config.models.model.trim().is_empty() {
        bail!("Model identifier cannot be empty");
    }

    if config.models.max_tokens == 0 {
        bail!("max_tokens must be greater than zero");
    }

    if !(0.0..=2.0).contains(&config.models.temperature) {
        bail!(
            "temperature must be between 0.0 and 2.0 (got {})",
            config.models.temperature
        );
    }

    Ok(())
}
