use anyhow::{Result, bail};
use colored::Colorize;
use serde_json::Value;

use crate::adapter::{AgentAdapter, FieldAccess};
use crate::adapters::{PredictOptions, RunOptions, SignatureAdapter, StructuredAdapter};
use crate::config::Config;
use crate::schema::{OutputSchema, parse_field_spec};

use super::args::{AdapterChoice, Cli};

pub(crate) fn build_schema(fields: &[String]) -> Result<OutputSchema> {
    let mut schema = OutputSchema::new();
    for spec in fields {
        let (name, kind) = parse_field_spec(spec)?;
        if schema.get(&name).is_some() {
            bail!("Field '{name}' was given more than once");
        }
        schema.insert(name, kind);
    }
    schema.validate()?;
    Ok(schema)
}

pub(crate) async fn run(cli: Cli, config: Config) -> Result<()> {
    let template = cli.template.join(" ").trim().to_owned();
    if template.is_empty() {
        bail!("Template cannot be empty. Usage: agent-adapter -f capital \"What is the capital of Türkiye?\"");
    }

    let schema = build_schema(&cli.fields)?;
    let config = match &cli.model {
        Some(model) => config.for_model(model)?,
        None => config,
    };
    config.validate()?;

    println!(
        "{} {} ({})",
        "Model:".bold(),
        config.models.model,
        config.llm.provider.display_name()
    );

    let run_options = RunOptions {
        instructions: cli.instructions.clone(),
        ..RunOptions::default()
    };
    let predict_options = PredictOptions {
        instructions: cli.instructions.clone(),
        string_signature: cli.string_signature,
        ..PredictOptions::default()
    };

    let succeeded = match cli.adapter {
        AdapterChoice::Structured => {
            let adapter = StructuredAdapter::new(config)?;
            let result = adapter.produce(&template, &schema, run_options).await;
            report("Structured", result)
        }
        AdapterChoice::Signature => {
            let adapter = SignatureAdapter::new(config)?;
            let result = adapter.produce(&template, &schema, predict_options).await;
            report("Signature", result)
        }
        AdapterChoice::Both => {
            let structured = StructuredAdapter::new(config.clone())?;
            let signature = SignatureAdapter::new(config)?;
            let (structured_result, signature_result) = tokio::join!(
                structured.produce(&template, &schema, run_options),
                signature.produce(&template, &schema, predict_options),
            );
            let structured_ok = report("Structured", structured_result);
            let signature_ok = report("Signature", signature_result);
            structured_ok && signature_ok
        }
    };

    if !succeeded {
        bail!("One or more adapters failed");
    }
    Ok(())
}

/// Prints the outcome; `false` when the adapter failed.
fn report<T: FieldAccess>(label: &str, result: Result<T>) -> bool {
    println!();
    match result {
        Ok(output) => {
            println!("{}", format!("✅ {label} result").green().bold());
            for name in output.field_names() {
                let value = match output.field(name) {
                    Some(Value::String(text)) => text.clone(),
                    Some(other) => other.to_string(),
                    None => continue,
                };
                println!("  {}: {}", name.cyan(), value);
            }
            true
        }
        Err(err) => {
            println!("{}", format!("❌ {label} failed").red().bold());
            println!("  {err:#}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmProvider;
    use crate::schema::FieldKind;
    use clap::Parser;
    use httpmock::prelude::*;

    fn mock_config(server: &MockServer) -> Config {
        Config::builder()
            .with_provider(LlmProvider::Groq)
            .with_llm(|llm| {
                llm.api_key = "test-key".to_string();
                llm.base_url = server.url("/v1");
            })
            .build()
            .unwrap()
    }

    #[test]
    fn build_schema_parses_field_specs() {
        let schema = build_schema(&["capital".to_string(), "population:int".to_string()]).unwrap();
        assert_eq!(schema.get("capital"), Some(&FieldKind::Str));
        assert_eq!(schema.get("population"), Some(&FieldKind::Int));
    }

    #[test]
    fn build_schema_rejects_duplicates() {
        let err = build_schema(&["capital".to_string(), "capital:int".to_string()]).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn cli_parses_fields_and_template() {
        let cli = Cli::try_parse_from([
            "agent-adapter",
            "--adapter",
            "signature",
            "-f",
            "capital",
            "-f",
            "country:str",
            "--string",
            "What",
            "is",
            "the",
            "capital?",
        ])
        .unwrap();

        assert_eq!(cli.adapter, AdapterChoice::Signature);
        assert_eq!(cli.fields, vec!["capital", "country:str"]);
        assert!(cli.string_signature);
        assert_eq!(cli.template.join(" "), "What is the capital?");
    }

    #[tokio::test]
    async fn run_fails_when_every_adapter_fails() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(503);
            })
            .await;

        let cli = Cli::try_parse_from(["agent-adapter", "-f", "capital", "Capital of Türkiye?"]).unwrap();
        let err = run(cli, mock_config(&server)).await.unwrap_err();

        assert!(err.to_string().contains("adapters failed"));
        mock.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn run_rejects_missing_api_key_before_any_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(500);
            })
            .await;

        let mut config = mock_config(&server);
        config.llm.api_key.clear();
        let cli = Cli::try_parse_from(["agent-adapter", "-f", "capital", "Capital?"]).unwrap();
        let err = run(cli, config).await.unwrap_err();

        assert!(err.to_string().contains("API key not found"));
        mock.assert_hits_async(0).await;
    }
}
