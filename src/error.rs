//! Error types for the test skeleton.
//!
//! This module provides the error hierarchy for every stage of a test run:
//! suite configuration, provisioning tool invocation and golden plan files.
//! Assertion mismatches are not errors; they are recorded as findings on the
//! run report (see [`crate::report::Finding`]).

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The main error type for the test skeleton.
#[derive(Debug, Error)]
pub enum SkeletonError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Provisioning tool errors.
    #[error("Provisioning tool error: {0}")]
    Tool(#[from] ToolError),

    /// Golden plan file errors.
    #[error("Golden file error: {0}")]
    Golden(#[from] GoldenError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Test-suite configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The suite file was not found.
    #[error("Test suite file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The suite file could not be parsed.
    #[error("Failed to parse test suite: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Test suite validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// An assertion operation name is not part of the closed set.
    #[error("Unknown assertion operation: {name}")]
    UnknownOperation {
        /// The unrecognized operation name.
        name: String,
    },

    /// A resource action name is not part of the closed set.
    #[error("Unknown resource action: {name}")]
    UnknownAction {
        /// The unrecognized action name.
        name: String,
    },
}

/// Errors reported by the provisioning tool adapter.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// The tool ran and exited unsuccessfully.
    #[error("`{command}` failed (exit code {exit_code:?}): {stderr}")]
    CommandFailed {
        /// The command line that was executed.
        command: String,
        /// Exit code, if the process exited normally.
        exit_code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// The requested output is not present in the state.
    #[error("Output \"{name}\" not found")]
    OutputNotFound {
        /// Output name.
        name: String,
    },

    /// The tool binary could not be started.
    #[error("Failed to spawn `{binary}`: {message}")]
    Spawn {
        /// Binary that failed to start.
        binary: String,
        /// Description of the failure.
        message: String,
    },

    /// The tool did not finish in time.
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout {
        /// The command line that was executed.
        command: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The tool produced output that could not be interpreted.
    #[error("Invalid output from `{command}`: {message}")]
    InvalidOutput {
        /// The command line that was executed.
        command: String,
        /// Description of the problem.
        message: String,
    },
}

/// Golden plan file errors.
#[derive(Debug, Error)]
pub enum GoldenError {
    /// The golden file could not be read or written.
    #[error("Cannot access golden file {path}: {message}")]
    Access {
        /// Path of the golden file.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// The golden file is not valid JSON of the expected shape.
    #[error("Malformed golden file {path}: {message}")]
    Malformed {
        /// Path of the golden file.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },
}

/// Result type alias for skeleton operations.
pub type Result<T> = std::result::Result<T, SkeletonError>;

impl SkeletonError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a parse error without a source location.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
            location: None,
        }
    }
}

impl ToolError {
    /// Returns the raw text the tool reported, as it would appear on a terminal.
    #[must_use]
    pub fn tool_message(&self) -> String {
        match self {
            Self::CommandFailed { stderr, .. } => stderr.clone(),
            other => other.to_string(),
        }
    }

    /// Returns true if the given retry patterns classify this error as transient.
    #[must_use]
    pub fn is_retryable(&self, patterns: &[regex::Regex]) -> bool {
        match self {
            Self::CommandFailed { stderr, .. } => patterns.iter().any(|p| p.is_match(stderr)),
            Self::Timeout { .. }
            | Self::OutputNotFound { .. }
            | Self::Spawn { .. }
            | Self::InvalidOutput { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_not_found_message_names_output() {
        let err = ToolError::OutputNotFound {
            name: String::from("public_ip"),
        };
        assert_eq!(err.to_string(), "Output \"public_ip\" not found");
    }

    #[test]
    fn test_retryable_matches_stderr_only() {
        let patterns = vec![regex::Regex::new("(?s).*Error acquiring the state lock.*").unwrap()];
        let locked = ToolError::CommandFailed {
            command: String::from("terraform apply"),
            exit_code: Some(1),
            stderr: String::from("Error: Error acquiring the state lock\n"),
        };
        let missing = ToolError::OutputNotFound {
            name: String::from("Error acquiring the state lock"),
        };
        assert!(locked.is_retryable(&patterns));
        assert!(!missing.is_retryable(&patterns));
    }
}
