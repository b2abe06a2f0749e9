//! One async interface over two styles of LLM agent.
//!
//! Callers describe the fields they want as an [`OutputSchema`] and hand it,
//! together with a prompt template, to any [`AgentAdapter`]:
//!
//! - [`StructuredAdapter`] turns the schema into a record type, requests JSON
//!   matching its JSON Schema and validates the reply.
//! - [`SignatureAdapter`] turns the schema into a signature and runs a
//!   one-shot [`Predict`] that reads each field from a marker-delimited reply.

pub mod adapter;
pub mod adapters;
pub mod cli;
pub mod client;
pub mod config;
mod parsing;
pub mod predict;
pub mod record;
pub mod schema;
pub mod signature;

pub use adapter::{AgentAdapter, FieldAccess};
pub use adapters::{PredictOptions, RunOptions, SignatureAdapter, StructuredAdapter};
pub use config::Config;
pub use predict::{Predict, Prediction};
pub use record::{Record, RecordType};
pub use schema::{FieldKind, OutputSchema};
pub use signature::{OutputType, Signature, SignatureField};
