use anyhow::{Context, Result, anyhow};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::adapter::FieldAccess;
use crate::schema::{FieldKind, OutputSchema};

/// Record type synthesized from an [`OutputSchema`]: a name plus required fields.
///
/// Built fresh on every request; two builds from the same schema are equal
/// but share nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordType {
    name: String,
    schema: OutputSchema,
}

impl RecordType {
    pub fn new(name: impl Into<String>, schema: &OutputSchema) -> Result<Self> {
        schema.validate()?;
        Ok(Self {
            name: name.into(),
            schema: schema.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldKind)> {
        self.schema.iter()
    }

    pub fn json_schema(&self) -> Value {
        let mut schema = self.schema.json_schema();
        if let Value::Object(map) = &mut schema {
            map.insert("title".to_string(), Value::String(self.name.clone()));
        }
        schema
    }

    /// Validates a decoded JSON value against this type.
    pub fn decode(&self, value: Value) -> Result<Record> {
        let Value::Object(map) = value else {
            return Err(anyhow!("{} expects a JSON object", self.name));
        };
        self.schema
            .check_object(&map)
            .with_context(|| format!("{} validation failed", self.name))?;

        Ok(Record {
            fields: self.schema.project_object(&map),
        })
    }

    pub fn decode_str(&self, json: &str) -> Result<Record> {
        let value: Value = serde_json::from_str(json)
            .with_context(|| format!("Failed to parse {} JSON: {json}", self.name))?;
        self.decode(value)
    }
}

/// Validated instance of a [`RecordType`], one entry per declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn into_value(self) -> Value {
        Value::Object(self.fields.into_iter().collect::<Map<String, Value>>())
    }

    /// Deserializes into a caller-defined struct.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T> {
        serde_json::from_value(self.into_value()).context("Failed to convert record")
    }
}

impl FieldAccess for Record {
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
