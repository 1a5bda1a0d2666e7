//! Run reports and findings.
//!
//! A finding is one independent, addressable failure: a mismatched
//! assertion, an unexpected or missing resource change, or a tool error.
//! A run passes only when it produced no findings and teardown did not fail.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ToolError;
use crate::tool::ToolOptions;

/// Category of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// An assertion did not hold.
    Assertion,
    /// An assertion is malformed (missing predicate or expected value).
    InvalidAssertion,
    /// An assertion uses an operation that is unknown in its mode.
    UnknownOperation,
    /// A resource is planned to change but should not.
    UnexpectedChange,
    /// An expected resource change is absent from the plan.
    MissingExpectedChange,
    /// A golden plan address is absent from the plan.
    Golden,
    /// The provisioning tool failed, or did not fail when it should have.
    Tool,
}

/// One reported failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    /// Category.
    pub kind: FindingKind,
    /// What the finding is about: output name, resource address or phase.
    pub subject: String,
    /// Human-readable description.
    pub message: String,
}

/// Outcome of the teardown step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TeardownStatus {
    /// The run was not asked to destroy its infrastructure.
    NotRequested,
    /// Destroy succeeded.
    Completed,
    /// Destroy failed; the infrastructure may still exist.
    Failed {
        /// Tool error text.
        error: String,
    },
}

/// Result of one orchestrated run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Which entry point produced the report (`deploy`, `plan`, ...).
    pub run: String,
    /// All findings, in the order they were recorded.
    pub findings: Vec<Finding>,
    /// Teardown outcome.
    pub teardown: TeardownStatus,
    /// Options as they were at the end of the run.
    pub options: ToolOptions,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
}

impl Finding {
    /// Creates a finding.
    #[must_use]
    pub fn new(kind: FindingKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            message: message.into(),
        }
    }

    /// Creates a finding for a failed tool invocation during `phase`.
    #[must_use]
    pub fn tool(phase: &str, error: &ToolError) -> Self {
        Self::new(FindingKind::Tool, phase, error.to_string())
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Assertion => "assertion",
            Self::InvalidAssertion => "invalid assertion",
            Self::UnknownOperation => "unknown operation",
            Self::UnexpectedChange => "unexpected change",
            Self::MissingExpectedChange => "missing change",
            Self::Golden => "golden",
            Self::Tool => "tool",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.subject, self.message)
    }
}

impl RunReport {
    /// Starts a report for the given entry point.
    #[must_use]
    pub fn start(run: impl Into<String>, options: &ToolOptions) -> Self {
        let now = Utc::now();
        Self {
            run: run.into(),
            findings: Vec::new(),
            teardown: TeardownStatus::NotRequested,
            options: options.clone(),
            started_at: now,
            finished_at: now,
        }
    }

    /// Stamps the finish time.
    #[must_use]
    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    /// Returns true if the run produced no findings and teardown did not fail.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.findings.is_empty() && !matches!(self.teardown, TeardownStatus::Failed { .. })
    }

    /// Number of findings.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.findings.len()
    }

    /// Findings of one kind.
    pub fn findings_of(&self, kind: FindingKind) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.kind == kind)
    }

    /// Fails the calling test if the run did not succeed.
    ///
    /// # Panics
    ///
    /// Panics with every finding listed when [`Self::is_success`] is false.
    pub fn assert_passed(&self) {
        assert!(self.is_success(), "{self}");
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.is_success() { "passed" } else { "failed" };
        writeln!(
            f,
            "Run '{}' {status} ({} finding(s)) in {}",
            self.run,
            self.findings.len(),
            self.options.working_dir.display()
        )?;
        for finding in &self.findings {
            writeln!(f, "  - {finding}")?;
        }
        match &self.teardown {
            TeardownStatus::NotRequested => Ok(()),
            TeardownStatus::Completed => writeln!(f, "  Teardown: completed"),
            TeardownStatus::Failed { error } => writeln!(f, "  Teardown: FAILED: {error}"),
        }
    }
}
