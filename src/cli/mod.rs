//! CLI module for the terra skeleton runner.
//!
//! This module provides the command-line interface for running
//! test suites against Terraform modules.

mod commands;
mod output;

pub use commands::{Cli, Commands, GoldenCommands, OutputFormat};
pub use output::OutputFormatter;
