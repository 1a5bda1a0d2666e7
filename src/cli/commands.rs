//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Terra skeleton - lifecycle tests for Terraform modules.
#[derive(Parser, Debug)]
#[command(name = "terra-skeleton")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the test-suite file.
    #[arg(short, long, global = true, env = "SKELETON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the test suite, then init and validate the module code.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,

        /// Only validate the suite file, without running the tool.
        #[arg(long)]
        suite_only: bool,
    },

    /// Plan the module and check the expected plan errors.
    Plan,

    /// Deploy, check outputs, verify changes and destroy.
    Apply {
        /// Leave the infrastructure in place.
        #[arg(long)]
        keep: bool,
    },

    /// Plan-only test, or a full deployment when `DO_APPLY=true`.
    Test,

    /// Capture or check golden plan files.
    Golden {
        /// Golden subcommand.
        #[command(subcommand)]
        command: GoldenCommands,
    },

    /// Generate a set of random Azure resource names.
    Names,
}

/// Golden plan subcommands.
#[derive(Subcommand, Debug)]
pub enum GoldenCommands {
    /// Plan the module and write its addresses to the golden file.
    Capture {
        /// Golden file (defaults to the suite's `golden` entry).
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Plan the module and check it against the golden file.
    Check {
        /// Golden file (defaults to the suite's `golden` entry).
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
