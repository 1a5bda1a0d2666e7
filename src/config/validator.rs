//! Test-suite validation.
//!
//! Catches suite mistakes before any infrastructure is touched: assertions
//! that could never pass, unknown actions and conflicting files.

use crate::assertion::AssertOperation;
use crate::error::{ConfigError, Result, SkeletonError};
use crate::tool::Action;
use std::collections::HashSet;
use tracing::debug;

use super::spec::{AdditionalChangesConfig, AssertionConfig, SuiteConfig};

/// Validator for test suites.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

/// Which list an assertion belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssertionMode {
    Outputs,
    Errors,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a test suite, collecting every error and warning.
    #[must_use]
    pub fn check(&self, config: &SuiteConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_module(config, &mut result);
        Self::validate_tool(config, &mut result);
        Self::validate_bootstrap(config, &mut result);
        Self::validate_assertions(&config.assertions, "assertions", AssertionMode::Outputs, &mut result);
        Self::validate_assertions(
            &config.expect_errors,
            "expect_errors",
            AssertionMode::Errors,
            &mut result,
        );
        Self::validate_additional_changes(&config.additional_changes, &mut result);

        if config.assertions.is_empty() && config.expect_errors.is_empty() {
            result
                .warnings
                .push(String::from("No assertions defined; only deployment is checked"));
        }

        result
    }

    /// Validates a test suite.
    ///
    /// # Errors
    ///
    /// Returns the first error if validation fails.
    pub fn validate(&self, config: &SuiteConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if result.errors.is_empty() {
            debug!("Test suite validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(SkeletonError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    fn validate_module(config: &SuiteConfig, result: &mut ValidationResult) {
        if config.module.dir.as_os_str().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("module.dir"),
                message: String::from("Module directory cannot be empty"),
            });
        }

        if let Some(plan_file) = &config.module.plan_file
            && plan_file.as_os_str().is_empty()
        {
            result.errors.push(ValidationError {
                field: String::from("module.plan_file"),
                message: String::from("Plan file cannot be empty when set"),
            });
        }

        for name in config.module.vars.keys() {
            if name.is_empty() {
                result.errors.push(ValidationError {
                    field: String::from("module.vars"),
                    message: String::from("Variable names cannot be empty"),
                });
            }
        }
    }

    fn validate_tool(config: &SuiteConfig, result: &mut ValidationResult) {
        if config.tool.binary.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("tool.binary"),
                message: String::from("Tool binary cannot be empty"),
            });
        }

        if config.tool.max_retries > 10 {
            result.warnings.push(format!(
                "tool.max_retries: {} retries may hide real failures",
                config.tool.max_retries
            ));
        }

        if config.tool.timeout_secs == Some(0) {
            result.errors.push(ValidationError {
                field: String::from("tool.timeout_secs"),
                message: String::from("Timeout must be at least 1 second"),
            });
        }
    }

    fn validate_bootstrap(config: &SuiteConfig, result: &mut ValidationResult) {
        let mut seen_active = HashSet::new();

        for (i, file) in config.bootstrap.iter().enumerate() {
            let prefix = format!("bootstrap[{i}]");

            if file.sample == file.active {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.active"),
                    message: format!(
                        "Sample and active file are the same: {}",
                        file.active.display()
                    ),
                });
            }

            if !seen_active.insert(&file.active) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.active"),
                    message: format!("Duplicate active file: {}", file.active.display()),
                });
            }
        }
    }

    fn validate_assertions(
        assertions: &[AssertionConfig],
        list: &str,
        mode: AssertionMode,
        result: &mut ValidationResult,
    ) {
        for (i, assertion) in assertions.iter().enumerate() {
            let prefix = format!("{list}[{i}]");
            let operation = AssertOperation::parse(&assertion.operation);

            if let AssertOperation::Unrecognized(name) = &operation {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.operation"),
                    message: format!("Unknown operation '{name}'"),
                });
                continue;
            }

            if operation.requires_check() {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.operation"),
                    message: format!(
                        "Operation '{operation}' needs a check function and cannot be written in a suite file"
                    ),
                });
                continue;
            }

            let in_error_mode = operation == AssertOperation::ErrorContains;
            match mode {
                AssertionMode::Outputs if in_error_mode => {
                    result.errors.push(ValidationError {
                        field: format!("{prefix}.operation"),
                        message: String::from("error_contains belongs in expect_errors"),
                    });
                }
                AssertionMode::Errors if !in_error_mode => {
                    result.errors.push(ValidationError {
                        field: format!("{prefix}.operation"),
                        message: format!("Only error_contains is allowed here, found '{operation}'"),
                    });
                }
                _ => {}
            }

            if operation.requires_expected() && assertion.expected.is_none() {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.expected"),
                    message: format!("Operation '{operation}' requires an expected value"),
                });
            }

            if operation.reads_output() && assertion.output.is_empty() {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.output"),
                    message: format!("Operation '{operation}' requires an output name"),
                });
            }

            if operation == AssertOperation::ListLengthEqual
                && let Some(expected) = &assertion.expected
                && expected.as_u64().is_none()
                && expected.as_str().is_none_or(|s| s.trim().parse::<u64>().is_err())
            {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.expected"),
                    message: format!("Expected list length must be a number, found {expected}"),
                });
            }
        }
    }

    fn validate_additional_changes(
        scenarios: &[AdditionalChangesConfig],
        result: &mut ValidationResult,
    ) {
        for (i, scenario) in scenarios.iter().enumerate() {
            let prefix = format!("additional_changes[{i}]");

            if scenario.vars.is_empty() && scenario.var_files.is_empty() && scenario.tf_code.is_none() {
                result
                    .warnings
                    .push(format!("{prefix}: scenario changes nothing"));
            }

            let mut seen = HashSet::new();
            for (j, change) in scenario.changed_resources.iter().enumerate() {
                let field = format!("{prefix}.changed_resources[{j}]");

                match change.action.parse::<Action>() {
                    Ok(action) if !action.is_change() => {
                        result.errors.push(ValidationError {
                            field: format!("{field}.action"),
                            message: format!(
                                "Action '{action}' is not a change; use create, update or delete"
                            ),
                        });
                    }
                    Ok(action) => {
                        if !seen.insert((change.name.as_str(), action)) {
                            result.warnings.push(format!(
                                "{field}: duplicate expected change {} ({action})",
                                change.name
                            ));
                        }
                    }
                    Err(e) => {
                        result.errors.push(ValidationError {
                            field: format!("{field}.action"),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }
    }
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
