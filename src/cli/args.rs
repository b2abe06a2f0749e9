use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

use super::commands;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AdapterChoice {
    /// JSON-schema validated record
    Structured,
    /// Field-marker signature prediction
    Signature,
    /// Run both adapters concurrently
    Both,
}

/// Entry point for the `agent-adapter` command-line interface.
#[derive(Debug, Parser)]
#[command(
    name = "agent-adapter",
    about = "Ask an LLM for a structured answer",
    version,
    long_about = None
)]
pub struct Cli {
    /// Which adapter handles the request
    #[arg(short = 'a', long = "adapter", value_enum, default_value_t = AdapterChoice::Both)]
    pub adapter: AdapterChoice,

    /// Output field as name or name:type (str, int, float, bool, list[T]); repeatable
    #[arg(short = 'f', long = "field", required = true)]
    pub fields: Vec<String>,

    /// Instructions attached to the request
    #[arg(short = 'i', long = "instructions")]
    pub instructions: Option<String>,

    /// Use a string signature for the signature adapter
    #[arg(long = "string")]
    pub string_signature: bool,

    /// Model, optionally provider-prefixed (groq:qwen/qwen3-32b or groq/qwen/qwen3-32b)
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    /// Enable debug logging of requests and responses
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Template sent to the model
    #[arg(required = true, trailing_var_arg = true)]
    pub template: Vec<String>,
}

impl Cli {
    /// `RUST_LOG` wins; otherwise `warn`, or `debug` for this crate with `-v`.
    pub fn init_tracing(&self) {
        let default = if self.verbose {
            "warn,agent_adapter=debug"
        } else {
            "warn"
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }

    pub async fn run(self) -> Result<()> {
        let config = Config::load_unchecked()?;
        commands::run(self, config).await
    }
}
