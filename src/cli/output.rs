//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying run reports,
//! golden files, validation results and generated names.

use colored::Colorize;
use std::fmt::Write;
use std::path::Path;
use tabled::{Table, Tabled};

use crate::config::{SuiteConfig, ValidationResult};
use crate::golden::GoldenPlan;
use crate::names::RandomNames;
use crate::report::{FindingKind, RunReport, TeardownStatus};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Finding row for table display.
#[derive(Tabled)]
struct FindingRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Subject")]
    subject: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Name row for table display.
#[derive(Tabled)]
struct NameRow {
    #[tabled(rename = "Name")]
    name: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a run report for display.
    #[must_use]
    pub fn format_report(&self, report: &RunReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_report_text(report),
        }
    }

    /// Formats a report as text.
    fn format_report_text(report: &RunReport) -> String {
        let mut output = String::new();

        let _ = writeln!(
            output,
            "\nRun: {} ({})",
            report.run,
            report.options.working_dir.display()
        );
        let elapsed = report.finished_at - report.started_at;
        let _ = writeln!(output, "   Duration: {}s\n", elapsed.num_seconds());

        if report.findings.is_empty() {
            let _ = writeln!(output, "{} No findings.", "✓".green());
        } else {
            let rows: Vec<FindingRow> = report
                .findings
                .iter()
                .enumerate()
                .map(|(i, f)| FindingRow {
                    index: i + 1,
                    kind: Self::format_kind(f.kind),
                    subject: Self::truncate(&f.subject, 60),
                    message: Self::truncate(&f.message, 100),
                })
                .collect();
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        match &report.teardown {
            TeardownStatus::NotRequested => {}
            TeardownStatus::Completed => {
                let _ = writeln!(output, "\nTeardown: {}", "completed".green());
            }
            TeardownStatus::Failed { error } => {
                let _ = writeln!(output, "\nTeardown: {}", "failed".red());
                let _ = writeln!(
                    output,
                    "{} Infrastructure may still exist: {error}",
                    "⚠".yellow()
                );
            }
        }

        let status = if report.is_success() {
            "passed".green().to_string()
        } else {
            "failed".red().to_string()
        };
        let _ = writeln!(
            output,
            "\nResult: {status} ({} finding(s))",
            report.failure_count()
        );

        output
    }

    /// Formats a golden plan after capture.
    #[must_use]
    pub fn format_golden(&self, golden: &GoldenPlan, path: &Path) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(golden).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = format!("{} Golden file written: {}\n", "✓".green(), path.display());
                let _ = writeln!(output, "   Planned values: {}", golden.planned_values.len());
                let _ = writeln!(output, "   Changed values: {}", golden.changed_values.len());
                output
            }
        }
    }

    /// Formats a validation result with a short suite summary.
    #[must_use]
    pub fn format_validation(
        &self,
        result: &ValidationResult,
        config: &SuiteConfig,
        show_warnings: bool,
    ) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "warnings": result.warnings,
                    "module": config.module.dir,
                    "assertions": config.assertions.len(),
                    "expect_errors": config.expect_errors.len(),
                    "additional_changes": config.additional_changes.len(),
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Test suite is valid!\n", "✓".green())
                } else {
                    let mut output = format!("{} Test suite is invalid:\n", "✗".red());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                    output
                };

                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }

                output.push_str("\nSuite summary:\n");
                let _ = writeln!(output, "   Module: {}", config.module.dir.display());
                let _ = writeln!(output, "   Assertions: {}", config.assertions.len());
                let _ = writeln!(output, "   Expected errors: {}", config.expect_errors.len());
                let _ = writeln!(output, "   Change scenarios: {}", config.additional_changes.len());
                output
            }
        }
    }

    /// Formats generated names.
    #[must_use]
    pub fn format_names(&self, names: &RandomNames) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(names).unwrap_or_default(),
            OutputFormat::Text => {
                let rows = vec![
                    NameRow {
                        name: "name_prefix",
                        value: names.name_prefix.clone(),
                    },
                    NameRow {
                        name: "resource_group_name",
                        value: names.resource_group_name.clone(),
                    },
                    NameRow {
                        name: "storage_account_name",
                        value: names.storage_account_name.clone(),
                    },
                ];
                format!("{}\n", Table::new(rows))
            }
        }
    }

    /// Formats a finding kind with color.
    fn format_kind(kind: FindingKind) -> String {
        match kind {
            FindingKind::Assertion | FindingKind::Golden => kind.to_string().red().to_string(),
            FindingKind::UnexpectedChange | FindingKind::MissingExpectedChange => {
                kind.to_string().yellow().to_string()
            }
            FindingKind::InvalidAssertion | FindingKind::UnknownOperation => {
                kind.to_string().magenta().to_string()
            }
            FindingKind::Tool => kind.to_string().bold().red().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}
