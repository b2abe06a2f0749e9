//! Framework-neutral description of the fields an agent reply must contain.
//!
//! An [`OutputSchema`] is an ordered list of `(name, FieldKind)` pairs. Both
//! adapters translate it into their own native form: a record type with a
//! JSON Schema, or a signature with typed output fields.

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};
use serde_json::{Map, Value, json};

/// Type of a single output field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Str,
    Int,
    Float,
    Bool,
    List(Box<FieldKind>),
    Record(OutputSchema),
}

impl FieldKind {
    pub fn list(inner: FieldKind) -> Self {
        FieldKind::List(Box::new(inner))
    }

    /// Human-readable type name used in string signatures and prompts.
    pub fn type_repr(&self) -> String {
        match self {
            FieldKind::Str => "str".to_string(),
            FieldKind::Int => "int".to_string(),
            FieldKind::Float => "float".to_string(),
            FieldKind::Bool => "bool".to_string(),
            FieldKind::List(inner) => format!("list[{}]", inner.type_repr()),
            FieldKind::Record(_) => "dict".to_string(),
        }
    }

    pub fn json_schema(&self) -> Value {
        match self {
            FieldKind::Str => json!({ "type": "string" }),
            FieldKind::Int => json!({ "type": "integer" }),
            FieldKind::Float => json!({ "type": "number" }),
            FieldKind::Bool => json!({ "type": "boolean" }),
            FieldKind::List(inner) => json!({ "type": "array", "items": inner.json_schema() }),
            FieldKind::Record(schema) => schema.json_schema(),
        }
    }

    /// Checks that `value` already has this kind's JSON shape.
    pub fn check(&self, value: &Value) -> Result<()> {
        match (self, value) {
            (FieldKind::Str, Value::String(_)) => Ok(()),
            (FieldKind::Int, Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(()),
            (FieldKind::Float, Value::Number(_)) => Ok(()),
            (FieldKind::Bool, Value::Bool(_)) => Ok(()),
            (FieldKind::List(inner), Value::Array(items)) => {
                for (idx, item) in items.iter().enumerate() {
                    inner
                        .check(item)
                        .with_context(|| format!("item {idx} of list"))?;
                }
                Ok(())
            }
            (FieldKind::Record(schema), Value::Object(map)) => schema.check_object(map),
            (kind, other) => Err(anyhow!(
                "expected {}, got {}",
                kind.type_repr(),
                json_type_name(other)
            )),
        }
    }

    /// Copy of a checked value with undeclared record keys dropped.
    pub(crate) fn project(&self, value: &Value) -> Value {
        match (self, value) {
            (FieldKind::List(inner), Value::Array(items)) => {
                Value::Array(items.iter().map(|item| inner.project(item)).collect())
            }
            (FieldKind::Record(schema), Value::Object(map)) => {
                Value::Object(schema.project_object(map).into_iter().collect())
            }
            (_, other) => other.clone(),
        }
    }

    /// Turns raw reply text into a value of this kind.
    ///
    /// Strings are taken verbatim; everything else is parsed as JSON first,
    /// with a fallback for bare booleans and numbers.
    pub fn coerce(&self, raw: &str) -> Result<Value> {
        let raw = raw.trim();
        let value = match self {
            FieldKind::Str => return Ok(Value::String(raw.to_string())),
            FieldKind::Bool => match raw.to_ascii_lowercase().as_str() {
                "true" | "yes" => Value::Bool(true),
                "false" | "no" => Value::Bool(false),
                other => bail!("expected bool, got '{other}'"),
            },
            FieldKind::Int => {
                let parsed = raw
                    .parse::<i64>()
                    .with_context(|| format!("expected int, got '{raw}'"))?;
                Value::from(parsed)
            }
            FieldKind::Float => {
                let parsed = raw
                    .parse::<f64>()
                    .with_context(|| format!("expected float, got '{raw}'"))?;
                serde_json::Number::from_f64(parsed)
                    .map(Value::Number)
                    .ok_or_else(|| anyhow!("expected finite float, got '{raw}'"))?
            }
            FieldKind::List(_) | FieldKind::Record(_) => serde_json::from_str(raw)
                .with_context(|| format!("expected JSON {}, got '{raw}'", self.type_repr()))?,
        };
        self.check(&value)?;
        Ok(value)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_repr())
    }
}

impl FromStr for FieldKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(inner) = s
            .strip_prefix("list[")
            .and_then(|rest| rest.strip_suffix(']'))
        {
            return Ok(FieldKind::list(inner.parse()?));
        }
        match s {
            "str" | "string" => Ok(FieldKind::Str),
            "int" | "integer" => Ok(FieldKind::Int),
            "float" | "number" => Ok(FieldKind::Float),
            "bool" | "boolean" => Ok(FieldKind::Bool),
            other => Err(anyhow!("Unknown field type '{other}'")),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Returns true for names usable as record field names.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Ordered mapping from field name to [`FieldKind`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputSchema {
    fields: Vec<(String, FieldKind)>,
}

impl OutputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field, replacing the kind if the name is already present.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.insert(name, kind);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, kind: FieldKind) {
        let name = name.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = kind,
            None => self.fields.push((name, kind)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldKind> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, kind)| kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldKind)> {
        self.fields.iter().map(|(name, kind)| (name.as_str(), kind))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Non-empty, identifier names, recursively for nested records.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            bail!("Output schema must declare at least one field");
        }
        for (name, kind) in &self.fields {
            if !is_identifier(name) {
                bail!("Output field name '{name}' is not a valid identifier");
            }
            validate_kind(kind).with_context(|| format!("Invalid type for field '{name}'"))?;
        }
        Ok(())
    }

    /// JSON Schema for an object with every field required.
    pub fn json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, kind)| (name.clone(), kind.json_schema()))
            .collect();
        let required: Vec<Value> = self
            .fields
            .iter()
            .map(|(name, _)| Value::String(name.clone()))
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Every declared field present with the right kind. Undeclared keys
    /// are allowed here and dropped by [`OutputSchema::project_object`].
    pub(crate) fn check_object(&self, map: &Map<String, Value>) -> Result<()> {
        for (name, kind) in &self.fields {
            let value = map
                .get(name)
                .ok_or_else(|| anyhow!("missing required field '{name}'"))?;
            kind.check(value)
                .with_context(|| format!("field '{name}' has the wrong type"))?;
        }
        Ok(())
    }

    /// Declared fields in schema order, nested records included.
    pub(crate) fn project_object(&self, map: &Map<String, Value>) -> Vec<(String, Value)> {
        self.fields
            .iter()
            .filter_map(|(name, kind)| map.get(name).map(|value| (name.clone(), kind.project(value))))
            .collect()
    }
}

fn validate_kind(kind: &FieldKind) -> Result<()> {
    match kind {
        FieldKind::List(inner) => validate_kind(inner),
        FieldKind::Record(schema) => schema.validate(),
        _ => Ok(()),
    }
}

impl<N: Into<String>> FromIterator<(N, FieldKind)> for OutputSchema {
    fn from_iter<I: IntoIterator<Item = (N, FieldKind)>>(iter: I) -> Self {
        let mut schema = OutputSchema::new();
        for (name, kind) in iter {
            schema.insert(name, kind);
        }
        schema
    }
}

/// Parses a `name:kind` pair, the form used on the command line.
pub fn parse_field_spec(spec: &str) -> Result<(String, FieldKind)> {
    let (name, kind) = match spec.split_once(':') {
        Some((name, kind)) => (name.trim(), kind.parse::<FieldKind>()?),
        None => (spec.trim(), FieldKind::Str),
    };
    if !is_identifier(name) {
        bail!("Output field name '{name}' is not a valid identifier");
    }
    Ok((name.to_string(), kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capital_schema() -> OutputSchema {
        OutputSchema::new()
            .field("capital", FieldKind::Str)
            .field("country", FieldKind::Str)
    }

    #[test]
    fn schema_preserves_declaration_order() {
        let schema = OutputSchema::new()
            .field("zeta", FieldKind::Int)
            .field("alpha", FieldKind::Bool);

        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
    }

    #[test]
    fn insert_replaces_existing_kind() {
        let schema = capital_schema().field("capital", FieldKind::Int);

        assert_eq!(schema.len(), 2);
        assert_eq!(schema.get("capital"), Some(&FieldKind::Int));
    }

    #[test]
    fn validate_rejects_empty_schema() {
        let err = OutputSchema::new().validate().unwrap_err();
        assert!(err.to_string().contains("at least one field"));
    }

    #[test]
    fn validate_rejects_non_identifier_names() {
        for bad in ["", "1st", "with space", "dash-ed"] {
            let schema = OutputSchema::new().field(bad, FieldKind::Str);
            assert!(schema.validate().is_err(), "{bad:?} should be rejected");
        }
        assert!(OutputSchema::new().field("_ok9", FieldKind::Str).validate().is_ok());
    }

    #[test]
    fn validate_checks_nested_records() {
        let schema = OutputSchema::new().field("inner", FieldKind::Record(OutputSchema::new()));
        let err = schema.validate().unwrap_err();
        assert!(format!("{err:#}").contains("field 'inner'"));
    }

    #[test]
    fn json_schema_requires_every_field() {
        let schema = capital_schema().field("population", FieldKind::Int);

        assert_eq!(
            schema.json_schema(),
            json!({
                "type": "object",
                "properties": {
                    "capital": {"type": "string"},
                    "country": {"type": "string"},
                    "population": {"type": "integer"}
                },
                "required": ["capital", "country", "population"],
                "additionalProperties": false
            })
        );
    }

    #[test]
    fn check_object_reports_missing_but_tolerates_extra_fields() {
        let schema = capital_schema();

        let missing = json!({"capital": "Ankara"});
        let err = schema.check_object(missing.as_object().unwrap()).unwrap_err();
        assert!(err.to_string().contains("missing required field 'country'"));

        let extra = json!({"capital": "Ankara", "country": "Türkiye", "mayor": "x"});
        schema.check_object(extra.as_object().unwrap()).unwrap();
    }

    #[test]
    fn project_object_drops_undeclared_keys_at_every_level() {
        let schema = OutputSchema::new()
            .field("capital", FieldKind::Str)
            .field(
                "districts",
                FieldKind::list(FieldKind::Record(
                    OutputSchema::new().field("name", FieldKind::Str),
                )),
            );
        let reply = json!({
            "note": "extra",
            "districts": [{"name": "Çankaya", "population": 900000}],
            "capital": "Ankara"
        });

        let projected = schema.project_object(reply.as_object().unwrap());
        assert_eq!(
            projected,
            vec![
                ("capital".to_string(), json!("Ankara")),
                ("districts".to_string(), json!([{"name": "Çankaya"}])),
            ]
        );
    }

    #[test]
    fn check_distinguishes_int_and_float() {
        assert!(FieldKind::Int.check(&json!(3)).is_ok());
        assert!(FieldKind::Int.check(&json!(3.5)).is_err());
        assert!(FieldKind::Float.check(&json!(3)).is_ok());
        assert!(FieldKind::list(FieldKind::Str).check(&json!(["a", 1])).is_err());
    }

    #[test]
    fn coerce_parses_reply_text() {
        assert_eq!(FieldKind::Str.coerce("  Ankara \n").unwrap(), json!("Ankara"));
        assert_eq!(FieldKind::Int.coerce("42").unwrap(), json!(42));
        assert_eq!(FieldKind::Bool.coerce("True").unwrap(), json!(true));
        assert_eq!(
            FieldKind::list(FieldKind::Int).coerce("[1, 2]").unwrap(),
            json!([1, 2])
        );
        assert!(FieldKind::Int.coerce("forty").is_err());
    }

    #[test]
    fn field_kind_parses_aliases_and_lists() {
        assert_eq!("string".parse::<FieldKind>().unwrap(), FieldKind::Str);
        assert_eq!("number".parse::<FieldKind>().unwrap(), FieldKind::Float);
        assert_eq!(
            "list[list[int]]".parse::<FieldKind>().unwrap(),
            FieldKind::list(FieldKind::list(FieldKind::Int))
        );
        assert!("tuple".parse::<FieldKind>().is_err());
    }

    #[test]
    fn type_repr_is_readable() {
        assert_eq!(FieldKind::list(FieldKind::Str).type_repr(), "list[str]");
        assert_eq!(FieldKind::Record(capital_schema()).type_repr(), "dict");
    }

    #[test]
    fn parse_field_spec_defaults_to_str() {
        assert_eq!(
            parse_field_spec("capital").unwrap(),
            ("capital".to_string(), FieldKind::Str)
        );
        assert_eq!(
            parse_field_spec("population:int").unwrap(),
            ("population".to_string(), FieldKind::Int)
        );
        assert!(parse_field_spec("bad name:str").is_err());
    }
}
