use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::adapter::{AgentAdapter, check_request};
use crate::client::{AIClient, DynLlmClient};
use crate::config::Config;
use crate::predict::{Predict, Prediction, bind_inputs};
use crate::schema::{FieldKind, OutputSchema};
use crate::signature::{OutputType, Signature, SignatureField, USER_PROMPT_FIELD};

pub const OUTPUT_SIGNATURE_NAME: &str = "OutputSignature";

#[derive(Debug, Clone, Default)]
pub struct PredictOptions {
    /// Ignored: `user_prompt` is always the template.
    pub user_prompt: Option<String>,
    /// Describe outputs with a string signature instead of a built one.
    pub string_signature: bool,
    pub instructions: Option<String>,
    /// Values for other declared input fields.
    pub inputs: BTreeMap<String, String>,
}

/// Adapter that builds a signature from the schema and runs one prediction.
///
/// The model configuration belongs to this instance; adapters with different
/// models can run side by side.
pub struct SignatureAdapter {
    config: Config,
    client: Arc<DynLlmClient>,
}

impl SignatureAdapter {
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

    /// `user_prompt: str` in, one output per schema entry.
    ///
    /// With `string` set, returns the compact string form instead, e.g.
    /// `user_prompt: str -> capital: str`.
    pub fn type_builder(output_schema: &OutputSchema, string: bool) -> Result<OutputType> {
        output_schema.validate()?;

        if string {
            let mut annotations = Vec::with_capacity(output_schema.len());
            for (name, kind) in output_schema.iter() {
                if matches!(kind, FieldKind::Record(_)) {
                    bail!("Field '{name}' is a nested record and cannot be written as a string signature");
                }
                annotations.push(format!("{name}: {}", kind.type_repr()));
            }
            return Ok(OutputType::Text(format!(
                "{USER_PROMPT_FIELD}: str -> {}",
                annotations.join(", ")
            )));
        }

        let mut signature = Signature::new(OUTPUT_SIGNATURE_NAME)
            .input(SignatureField::new(USER_PROMPT_FIELD, FieldKind::Str));
        for (name, kind) in output_schema.iter() {
            signature = signature.output(SignatureField::new(name, kind.clone()));
        }
        Ok(OutputType::Signature(signature))
    }

    /// Runs against a pre-built descriptor instead of a schema.
    ///
    /// The descriptor is checked before any request is made.
    pub async fn produce_with(
        &self,
        template: &str,
        output_type: OutputType,
        options: PredictOptions,
    ) -> Result<Prediction> {
        if template.trim().is_empty() {
            bail!("Template cannot be empty");
        }
        let signature = output_type.into_signature()?;
        self.predict(signature, template, options).await
    }

    async fn predict(
        &self,
        signature: Signature,
        template: &str,
        options: PredictOptions,
    ) -> Result<Prediction> {
        let PredictOptions {
            user_prompt,
            instructions,
            inputs,
            ..
        } = options;
        if user_prompt.is_some() {
            debug!("discarding user_prompt option; the template is used instead");
        }

        let signature = signature.with_instructions(instructions);
        let (bound, dropped) = bind_inputs(&signature, template, inputs);
        if !dropped.is_empty() {
            warn!(
                signature = %signature,
                dropped = ?dropped,
                "ignoring inputs the signature does not declare"
            );
        }

        Predict::new(signature)
            .call(self.client.as_ref(), &self.config.models, &bound)
            .await
    }
}

#[async_trait]
impl AgentAdapter for SignatureAdapter {
    type Options = PredictOptions;
    type Output = Prediction;

    async fn produce(
        &self,
        template: &str,
        output_schema: &OutputSchema,
        options: PredictOptions,
    ) -> Result<Prediction> {
        check_request(template, output_schema)?;
        let signature = Self::type_builder(output_schema, options.string_signature)?.into_signature()?;
        self.predict(signature, template, options).await
    }
}
