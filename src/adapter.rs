//! The contract every agent adapter satisfies.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::Value;

use crate::schema::OutputSchema;

/// Name-based access to the fields of a produced result.
pub trait FieldAccess {
    fn field(&self, name: &str) -> Option<&Value>;

    fn field_names(&self) -> Vec<&str>;

    fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    fn require(&self, name: &str) -> Result<&Value> {
        self.field(name)
            .ok_or_else(|| anyhow!("Result has no field named '{name}'"))
    }
}

/// Turns a template plus an output schema into a structured result.
///
/// Each adapter picks its own option type (what would otherwise be loose
/// keyword arguments) and its own result type.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    type Options: Default + Send;
    type Output: FieldAccess + Send;

    async fn produce(
        &self,
        template: &str,
        output_schema: &OutputSchema,
        options: Self::Options,
    ) -> Result<Self::Output>;

    /// Blocking form of [`AgentAdapter::produce`]. Panics if called from
    /// within a tokio runtime, like any `block_on`.
    fn produce_sync(
        &self,
        template: &str,
        output_schema: &OutputSchema,
        options: Self::Options,
    ) -> Result<Self::Output> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start runtime for produce_sync")?;
        runtime.block_on(self.produce(template, output_schema, options))
    }
}

/// Preconditions shared by every `produce` implementation.
pub(crate) fn check_request(template: &str, output_schema: &OutputSchema) -> Result<()> {
    if template.trim().is_empty() {
        bail!("Template cannot be empty");
    }
    output_schema.validate()
}
