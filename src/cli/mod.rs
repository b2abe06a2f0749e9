mod args;
mod commands;

pub use args::{AdapterChoice, Cli};
