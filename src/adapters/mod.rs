//! Concrete [`AgentAdapter`](crate::adapter::AgentAdapter) implementations.

pub mod signature;
pub mod structured;

pub use signature::{PredictOptions, SignatureAdapter};
pub use structured::{AgentRun, RunOptions, StructuredAdapter};
