//! Command-line adapter for the narrator reading engine.
//!
//! `narrator` wires the synthesis service, the playback engine and a JSON
//! settings file together and exposes them as subcommands.
#![deny(unused_crate_dependencies)]

#[cfg(test)]
use tokio_test as _;

// Used by the binary target only
use tracing_subscriber as _;

pub mod bootstrap;
pub mod commands;
pub mod handlers;
pub mod parser;

pub use bootstrap::{CliConfig, CliContext, bootstrap};
pub use commands::Commands;
pub use parser::Cli;
