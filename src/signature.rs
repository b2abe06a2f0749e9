//! Declarative input/output descriptions for one-shot predictions.
//!
//! A [`Signature`] can be built field by field or parsed from the compact
//! string form `user_prompt: str -> capital: str, country: str`.

use std::collections::HashSet;
use std::fmt;

use anyhow::{Context, Result, anyhow, bail};

use crate::schema::{FieldKind, is_identifier};

pub const USER_PROMPT_FIELD: &str = "user_prompt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Input,
    Output,
}

impl fmt::Display for FieldRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRole::Input => write!(f, "input"),
            FieldRole::Output => write!(f, "output"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignatureField {
    pub name: String,
    pub kind: FieldKind,
    pub description: Option<String>,
}

impl SignatureField {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn render(&self) -> String {
        format!("{}: {}", self.name, self.kind.type_repr())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    name: String,
    instructions: Option<String>,
    inputs: Vec<SignatureField>,
    outputs: Vec<SignatureField>,
}

impl Signature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn input(mut self, field: SignatureField) -> Self {
        self.inputs.push(field);
        self
    }

    pub fn output(mut self, field: SignatureField) -> Self {
        self.outputs.push(field);
        self
    }

    /// Same fields, different instructions. `None` or blank text keeps the
    /// current ones.
    pub fn with_instructions(mut self, instructions: Option<impl Into<String>>) -> Self {
        let instructions = instructions
            .map(Into::into)
            .filter(|text: &String| !text.trim().is_empty());
        if let Some(instructions) = instructions {
            self.instructions = Some(instructions);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[SignatureField] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[SignatureField] {
        &self.outputs
    }

    pub fn has_input(&self, name: &str) -> bool {
        self.inputs.iter().any(|field| field.name == name)
    }

    pub fn field(&self, name: &str) -> Option<(FieldRole, &SignatureField)> {
        self.inputs
            .iter()
            .find(|field| field.name == name)
            .map(|field| (FieldRole::Input, field))
            .or_else(|| {
                self.outputs
                    .iter()
                    .find(|field| field.name == name)
                    .map(|field| (FieldRole::Output, field))
            })
    }

    /// Explicit instructions, or a default derived from the field names.
    pub fn instructions(&self) -> String {
        match &self.instructions {
            Some(instructions) => instructions.clone(),
            None => format!(
                "Given the fields {}, produce the fields {}.",
                quoted_names(&self.inputs),
                quoted_names(&self.outputs)
            ),
        }
    }

    pub fn has_custom_instructions(&self) -> bool {
        self.instructions.is_some()
    }

    /// Compact string form, inputs and outputs in declaration order.
    pub fn render(&self) -> String {
        let side = |fields: &[SignatureField]| {
            fields
                .iter()
                .map(SignatureField::render)
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!("{} -> {}", side(&self.inputs), side(&self.outputs))
    }

    /// Parses `a: str, b -> c: int`. Untyped fields are strings.
    pub fn parse(expression: &str) -> Result<Self> {
        let (inputs, outputs) = expression
            .split_once("->")
            .ok_or_else(|| anyhow!("Signature '{expression}' is missing '->'"))?;
        if outputs.contains("->") {
            bail!("Signature '{expression}' has more than one '->'");
        }

        let mut signature = Signature::new("StringSignature");
        for field in parse_side(inputs).context("Invalid signature inputs")? {
            signature = signature.input(field);
        }
        for field in parse_side(outputs).context("Invalid signature outputs")? {
            signature = signature.output(field);
        }
        signature.validate()?;
        Ok(signature)
    }

    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            bail!("Signature {} declares no input fields", self.name);
        }
        if self.outputs.is_empty() {
            bail!("Signature {} declares no output fields", self.name);
        }

        let mut seen = HashSet::new();
        for field in self.inputs.iter().chain(&self.outputs) {
            if !is_identifier(&field.name) {
                bail!("Signature field '{}' is not a valid identifier", field.name);
            }
            if !seen.insert(field.name.as_str()) {
                bail!("Signature field '{}' is declared twice", field.name);
            }
        }
        Ok(())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

fn quoted_names(fields: &[SignatureField]) -> String {
    fields
        .iter()
        .map(|field| format!("`{}`", field.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_side(side: &str) -> Result<Vec<SignatureField>> {
    let mut fields = Vec::new();
    for part in split_top_level(side).into_iter().map(str::trim) {
        if part.is_empty() {
            continue;
        }
        let field = match part.split_once(':') {
            Some((name, kind)) => {
                let name = name.trim();
                let kind = kind
                    .parse::<FieldKind>()
                    .with_context(|| format!("Invalid type for field '{name}'"))?;
                SignatureField::new(name, kind)
            }
            None => SignatureField::new(part, FieldKind::Str),
        };
        fields.push(field);
    }
    Ok(fields)
}

/// Splits on commas that are not inside `[...]`.
fn split_top_level(side: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, ch) in side.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&side[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&side[start..]);
    parts
}

/// Pre-built output descriptor for callers that skip schema translation.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputType {
    Signature(Signature),
    Text(String),
}

impl OutputType {
    /// Resolves to a signature that takes `user_prompt`, or fails.
    pub fn into_signature(self) -> Result<Signature> {
        let signature = match self {
            OutputType::Signature(signature) => {
                signature.validate()?;
                signature
            }
            OutputType::Text(expression) => Signature::parse(&expression)
                .with_context(|| format!("'{expression}' is not a usable signature"))?,
        };
        if !signature.has_input(USER_PROMPT_FIELD) {
            bail!(
                "Signature {} must declare a `{USER_PROMPT_FIELD}` input field",
                signature.name()
            );
        }
        Ok(signature)
    }
}

impl From<Signature> for OutputType {
    fn from(signature: Signature) -> Self {
        OutputType::Signature(signature)
    }
}
