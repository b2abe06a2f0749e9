//! One-shot predictions built from a [`Signature`].
//!
//! Every field travels under a `[[ ## name ## ]]` marker, both in the prompt
//! and in the model's reply, and the reply ends with `[[ ## completed ## ]]`.

use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::adapter::FieldAccess;
use crate::client::{ChatCompletionRequest, ChatMessage, DynLlmClient, Usage};
use crate::config::ModelSettings;
use crate::parsing::strip_think_blocks;
use crate::schema::FieldKind;
use crate::signature::{Signature, SignatureField, USER_PROMPT_FIELD};

const COMPLETED_MARKER: &str = "completed";

fn marker(name: &str) -> String {
    format!("[[ ## {name} ## ]]")
}

fn type_hint(kind: &FieldKind) -> Option<String> {
    match kind {
        FieldKind::Str => None,
        FieldKind::Int | FieldKind::Float | FieldKind::Bool => {
            Some(format!("must be formatted as a valid {}", kind.type_repr()))
        }
        FieldKind::List(_) | FieldKind::Record(_) => Some(format!(
            "must be formatted as valid JSON matching this schema: {}",
            kind.json_schema()
        )),
    }
}

fn describe_fields(fields: &[SignatureField]) -> String {
    fields
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            let mut line = format!("{}. `{}` ({})", idx + 1, field.name, field.kind.type_repr());
            if let Some(description) = &field.description {
                line.push_str(": ");
                line.push_str(description);
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Callable that runs a signature against a model exactly once.
#[derive(Debug, Clone)]
pub struct Predict {
    signature: Signature,
}

impl Predict {
    pub fn new(signature: Signature) -> Self {
        Self { signature }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    fn system_prompt(&self) -> String {
        let mut prompt = String::new();
        prompt.push_str("Your input fields are:\n");
        prompt.push_str(&describe_fields(self.signature.inputs()));
        prompt.push_str("\nYour output fields are:\n");
        prompt.push_str(&describe_fields(self.signature.outputs()));
        prompt.push_str(
            "\nAll interactions will be structured in the following way, with the appropriate values filled in.\n\n",
        );

        for field in self.signature.inputs().iter().chain(self.signature.outputs()) {
            prompt.push_str(&marker(&field.name));
            prompt.push_str(&format!("\n{{{}}}", field.name));
            if let Some(hint) = type_hint(&field.kind) {
                prompt.push_str(&format!("        # note: the value you produce {hint}"));
            }
            prompt.push_str("\n\n");
        }
        prompt.push_str(&marker(COMPLETED_MARKER));
        prompt.push_str("\nIn adhering to this structure, your objective is: ");
        prompt.push_str(&self.signature.instructions());
        prompt
    }

    fn user_prompt(&self, inputs: &BTreeMap<String, String>) -> Result<String> {
        let mut prompt = String::new();
        for field in self.signature.inputs() {
            let value = inputs
                .get(&field.name)
                .ok_or_else(|| anyhow!("Missing value for input field '{}'", field.name))?;
            prompt.push_str(&marker(&field.name));
            prompt.push('\n');
            prompt.push_str(value);
            prompt.push_str("\n\n");
        }

        let outputs = self
            .signature
            .outputs()
            .iter()
            .map(|field| match type_hint(&field.kind) {
                Some(hint) => format!("`{}` ({hint})", marker(&field.name)),
                None => format!("`{}`", marker(&field.name)),
            })
            .collect::<Vec<_>>()
            .join(", then ");
        prompt.push_str(&format!(
            "Respond with the corresponding output fields, starting with the field {outputs}, and then ending with the marker for `{}`.",
            marker(COMPLETED_MARKER)
        ));
        Ok(prompt)
    }

    /// Chat messages for one call. Every declared input must be bound.
    pub fn messages(&self, inputs: &BTreeMap<String, String>) -> Result<Vec<ChatMessage>> {
        Ok(vec![
            ChatMessage::system(self.system_prompt()),
            ChatMessage::user(self.user_prompt(inputs)?),
        ])
    }

    pub async fn call(
        &self,
        client: &DynLlmClient,
        settings: &ModelSettings,
        inputs: &BTreeMap<String, String>,
    ) -> Result<Prediction> {
        let request = ChatCompletionRequest {
            model: settings.model.clone(),
            messages: self.messages(inputs)?,
            max_tokens: Some(settings.max_tokens),
            temperature: Some(settings.temperature),
            response_format: None,
        };

        debug!(signature = %self.signature, model = %settings.model, "running prediction");
        let response = client
            .chat_completion(request)
            .await
            .with_context(|| format!("Prediction for {} failed", self.signature.name()))?;

        let content = response.first_content()?;
        let mut prediction = self.parse_reply(content)?;
        prediction.usage = response.usage;
        Ok(prediction)
    }

    /// Pulls every declared output out of a marker-delimited reply.
    pub fn parse_reply(&self, reply: &str) -> Result<Prediction> {
        let sections = split_sections(&strip_think_blocks(reply));

        let mut fields = Vec::with_capacity(self.signature.outputs().len());
        for field in self.signature.outputs() {
            let raw = sections
                .iter()
                .find(|(name, _)| *name == field.name)
                .map(|(_, body)| body.as_str())
                .ok_or_else(|| {
                    anyhow!(
                        "Prediction reply is missing output field '{}': {reply}",
                        field.name
                    )
                })?;
            let value = field
                .kind
                .coerce(raw)
                .with_context(|| format!("Failed to parse output field '{}'", field.name))?;
            fields.push((field.name.clone(), value));
        }

        Ok(Prediction {
            fields,
            raw: reply.to_string(),
            usage: None,
        })
    }
}

/// `(name, body)` pairs in reply order; text before the first marker and
/// after `completed` is dropped.
fn split_sections(reply: &str) -> Vec<(String, String)> {
    let mut sections: Vec<(String, String)> = Vec::new();
    let mut rest = reply;

    while let Some(open) = rest.find("[[ ## ") {
        let after_open = &rest[open + "[[ ## ".len()..];
        let Some(close) = after_open.find(" ## ]]") else {
            break;
        };
        let name = after_open[..close].trim().to_string();
        let body_start = &after_open[close + " ## ]]".len()..];
        let body_end = body_start.find("[[ ## ").unwrap_or(body_start.len());

        if name == COMPLETED_MARKER {
            break;
        }
        sections.push((name, body_start[..body_end].trim().to_string()));
        rest = &body_start[body_end..];
    }

    sections
}

/// Result of a [`Predict`] call: one value per declared output field.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    fields: Vec<(String, Value)>,
    raw: String,
    usage: Option<Usage>,
}

impl Prediction {
    /// Reply text as returned by the model.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn usage(&self) -> Option<Usage> {
        self.usage
    }

    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T> {
        let object: Map<String, Value> = self.fields.into_iter().collect();
        serde_json::from_value(Value::Object(object)).context("Failed to convert prediction")
    }
}

impl FieldAccess for Prediction {
    fn field(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(name, _)| name.as_str()).collect()
    }
}

/// Binds `user_prompt` plus any extra inputs the signature declares.
///
/// Returns the bindings and the names of extras that were dropped. An extra
/// named `user_prompt` never overrides the template.
pub(crate) fn bind_inputs(
    signature: &Signature,
    user_prompt: &str,
    extra: BTreeMap<String, String>,
) -> (BTreeMap<String, String>, Vec<String>) {
    let mut bound = BTreeMap::new();
    bound.insert(USER_PROMPT_FIELD.to_string(), user_prompt.to_string());

    let mut dropped = Vec::new();
    for (name, value) in extra {
        if name != USER_PROMPT_FIELD && signature.has_input(&name) {
            bound.insert(name, value);
        } else {
            dropped.push(name);
        }
    }
    (bound, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn capital_predict() -> Predict {
        Predict::new(
            Signature::new("OutputSignature")
                .input(SignatureField::new(USER_PROMPT_FIELD, FieldKind::Str))
                .output(SignatureField::new("capital", FieldKind::Str))
                .output(SignatureField::new("population", FieldKind::Int)),
        )
    }

    fn prompt_inputs(prompt: &str) -> BTreeMap<String, String> {
        BTreeMap::from([(USER_PROMPT_FIELD.to_string(), prompt.to_string())])
    }

    #[test]
    fn messages_describe_fields_and_instructions() {
        let messages = capital_predict()
            .messages(&prompt_inputs("What is the capital of Türkiye?"))
            .unwrap();

        assert_eq!(messages.len(), 2);
        let system = &messages[0].content;
        assert!(system.contains("1. `user_prompt` (str)"));
        assert!(system.contains("2. `population` (int)"));
        assert!(system.contains("[[ ## completed ## ]]"));
        assert!(system.ends_with(
            "Given the fields `user_prompt`, produce the fields `capital`, `population`."
        ));

        let user = &messages[1].content;
        assert!(user.starts_with("[[ ## user_prompt ## ]]\nWhat is the capital of Türkiye?"));
        assert!(user.contains("`[[ ## population ## ]]` (must be formatted as a valid int)"));
    }

    #[test]
    fn messages_require_every_input() {
        let err = capital_predict().messages(&BTreeMap::new()).unwrap_err();
        assert!(err.to_string().contains("Missing value for input field 'user_prompt'"));
    }

    #[test]
    fn parse_reply_coerces_outputs() {
        let reply = "<think>hmm</think>\n[[ ## capital ## ]]\nAnkara\n\n[[ ## population ## ]]\n5700000\n\n[[ ## completed ## ]]";
        let prediction = capital_predict().parse_reply(reply).unwrap();

        assert_eq!(prediction.str_field("capital"), Some("Ankara"));
        assert_eq!(prediction.field("population"), Some(&json!(5_700_000)));
        assert_eq!(prediction.field_names(), vec!["capital", "population"]);
        assert_eq!(prediction.raw(), reply);
    }

    #[test]
    fn parse_reply_errors_on_missing_output() {
        let err = capital_predict()
            .parse_reply("[[ ## capital ## ]]\nAnkara\n[[ ## completed ## ]]")
            .unwrap_err();
        assert!(err.to_string().contains("missing output field 'population'"));
    }

    #[test]
    fn parse_reply_errors_on_bad_type() {
        let err = capital_predict()
            .parse_reply("[[ ## capital ## ]]\nAnkara\n[[ ## population ## ]]\nmany")
            .unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse output field 'population'"));
    }

    #[test]
    fn split_sections_ignores_text_after_completed() {
        let sections = split_sections(
            "preamble [[ ## a ## ]] one [[ ## completed ## ]] [[ ## b ## ]] two",
        );
        assert_eq!(sections, vec![("a".to_string(), "one".to_string())]);
    }

    #[test]
    fn bind_inputs_drops_undeclared_extras() {
        let signature = capital_predict().signature().clone();
        let extra = BTreeMap::from([
            ("country".to_string(), "Türkiye".to_string()),
            (USER_PROMPT_FIELD.to_string(), "override".to_string()),
        ]);

        let (bound, dropped) = bind_inputs(&signature, "template", extra);
        assert_eq!(bound, prompt_inputs("template"));
        assert_eq!(dropped, vec!["country".to_string(), USER_PROMPT_FIELD.to_string()]);
    }

    #[test]
    fn into_typed_reads_outputs() {
        #[derive(serde::Deserialize)]
        struct Answer {
            capital: String,
            population: u64,
        }

        let answer: Answer = capital_predict()
            .parse_reply("[[ ## capital ## ]]\nAnkara\n[[ ## population ## ]]\n42")
            .unwrap()
            .into_typed()
            .unwrap();
        assert_eq!(answer.capital, "Ankara");
        assert_eq!(answer.population, 42);
    }
}
