//! Adapter configuration.
//!
//! Settings are layered in this order:
//! - built-in defaults
//! - the JSON file at `~/.agent-adapter/config`
//! - environment variable overrides
//!
//! The result is a plain value handed to each adapter at construction time.

mod builder;
mod constants;
mod defaults;
mod environment;
mod loader;
mod model;
mod types;
mod validation;

pub use builder::ConfigBuilder;
pub use model::ModelRef;
pub use constants::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE};
pub use types::{Config, LlmProvider, LlmSettings, ModelSettings};
