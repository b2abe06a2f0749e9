use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use tracing::debug;

use crate::adapter::{AgentAdapter, check_request};
use crate::client::{
    AIClient, ChatCompletionRequest, ChatMessage, DynLlmClient, JsonSchemaFormat, ResponseFormat,
    Usage,
};
use crate::config::Config;
use crate::parsing::extract_json_object;
use crate::record::{Record, RecordType};
use crate::schema::OutputSchema;

pub const OUTPUT_MODEL_NAME: &str = "OutputModel";

/// Per-call run settings. Unset values fall back to the adapter's config.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Extra system instructions placed ahead of the output contract.
    pub instructions: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// A completed run. `output` is the validated record.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub output: Record,
    pub model: String,
    pub usage: Option<Usage>,
    pub finish_reason: Option<String>,
}

/// Adapter that asks for JSON matching a record type and validates the reply.
pub struct StructuredAdapter {
    config: Config,
    client: Arc<DynLlmClient>,
}

impl StructuredAdapter {
    pub fn new(config: Config) -> Result<Self> {
        let client = AIClient::new(&config.llm)?;
        Ok(Self::with_client(config, Arc::new(client)))
    }

    pub fn with_client(config: Config, client: Arc<DynLlmClient>) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Builds a new record type with one required field per schema entry.
    pub fn type_builder(output_schema: &OutputSchema) -> Result<RecordType> {
        RecordType::new(OUTPUT_MODEL_NAME, output_schema)
    }

    fn system_prompt(record_type: &RecordType, instructions: Option<&str>) -> String {
        let contract = format!(
            "Respond with exactly one JSON object matching the `{}` schema below. No prose, no markdown.\n{}",
            record_type.name(),
            record_type.json_schema()
        );
        match instructions {
            Some(instructions) if !instructions.trim().is_empty() => {
                format!("{}\n\n{contract}", instructions.trim())
            }
            _ => contract,
        }
    }

    pub async fn run(
        &self,
        template: &str,
        output_schema: &OutputSchema,
        options: RunOptions,
    ) -> Result<AgentRun> {
        check_request(template, output_schema)?;
        let record_type = Self::type_builder(output_schema)?;

        let request = ChatCompletionRequest {
            model: self.config.models.model.clone(),
            messages: vec![
                ChatMessage::system(Self::system_prompt(
                    &record_type,
                    options.instructions.as_deref(),
                )),
                ChatMessage::user(template),
            ],
            max_tokens: Some(options.max_tokens.unwrap_or(self.config.models.max_tokens)),
            temperature: Some(options.temperature.unwrap_or(self.config.models.temperature)),
            response_format: Some(ResponseFormat::JsonSchema {
                json_schema: JsonSchemaFormat {
                    name: record_type.name().to_string(),
                    schema: record_type.json_schema(),
                    strict: true,
                },
            }),
        };

        debug!(
            model = %self.config.models.model,
            fields = output_schema.len(),
            "running structured agent"
        );
        let response = self
            .client
            .chat_completion(request)
            .await
            .context("Structured agent run failed")?;

        let content = response.first_content()?;
        let json_fragment = extract_json_object(content)
            .ok_or_else(|| anyhow!("Agent response did not contain a JSON object: {content}"))?;
        let output = record_type.decode_str(&json_fragment)?;

        Ok(AgentRun {
            output,
            model: response
                .model
                .clone()
                .unwrap_or_else(|| self.config.models.model.clone()),
            usage: response.usage,
            finish_reason: response
                .choices
                .first()
                .and_then(|choice| choice.finish_reason.clone()),
        })
    }
}

#[async_trait]
impl AgentAdapter for StructuredAdapter {
    type Options = RunOptions;
    type Output = Record;

    async fn produce(
        &self,
        template: &str,
        output_schema: &OutputSchema,
        options: RunOptions,
    ) -> Result<Record> {
        Ok(self.run(template, output_schema, options).await?.output)
    }
}
