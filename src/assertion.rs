//! Assertion engine.
//!
//! Evaluates declarative [`AssertExpression`] lists against module outputs,
//! against caller-supplied values, or against the error text of a failed
//! tool run. Every expression is evaluated; failures are collected as
//! [`Finding`]s rather than aborting the list.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::ToolError;
use crate::report::{Finding, FindingKind};
use crate::tool::{Provisioner, ToolOptions};

/// Predicate used by the `CheckFunction*` operations.
pub type CheckFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Operation of an assertion expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AssertOperation {
    /// Output is not empty.
    NotEmpty,
    /// Output is empty.
    Empty,
    /// Output equals the expected value.
    Equal,
    /// Reading the output fails because it does not exist.
    NotFound,
    /// Output, read as a list, has the expected length.
    ListLengthEqual,
    /// Output starts with the expected value.
    StartsWith,
    /// The predicate holds for the output.
    CheckFunctionWithOutput,
    /// The predicate holds for the tested value.
    CheckFunctionWithValue,
    /// The tested value equals the expected value.
    EqualToValue,
    /// The tool error message contains the expected value.
    ErrorContains,
    /// An operation name that is not part of the closed set.
    Unrecognized(String),
}

/// One declarative check.
#[derive(Clone)]
pub struct AssertExpression {
    /// Output to read, for operations that read one.
    pub output_name: String,
    /// What to check.
    pub operation: AssertOperation,
    /// Expected value, for operations that compare.
    pub expected_value: Option<serde_json::Value>,
    /// Message reported with a failure.
    pub message: String,
    /// Predicate, for the `CheckFunction*` operations.
    pub check: Option<CheckFn>,
    /// Value checked without reading an output.
    pub tested_value: String,
}

/// Evaluates assertion lists.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssertionEngine;

impl AssertOperation {
    /// Parses an operation name, in `snake_case` or `CamelCase`.
    ///
    /// Unknown names map to [`AssertOperation::Unrecognized`] so that they
    /// surface as failures instead of being skipped.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "notempty" => Self::NotEmpty,
            "empty" => Self::Empty,
            "equal" => Self::Equal,
            "notfound" => Self::NotFound,
            "listlengthequal" => Self::ListLengthEqual,
            "startswith" => Self::StartsWith,
            "checkfunctionwithoutput" => Self::CheckFunctionWithOutput,
            "checkfunctionwithvalue" => Self::CheckFunctionWithValue,
            "equaltovalue" => Self::EqualToValue,
            "errorcontains" => Self::ErrorContains,
            _ => Self::Unrecognized(name.to_string()),
        }
    }

    /// Returns true if the operation needs a predicate.
    #[must_use]
    pub const fn requires_check(&self) -> bool {
        matches!(
            self,
            Self::CheckFunctionWithOutput | Self::CheckFunctionWithValue
        )
    }

    /// Returns true if the operation needs an expected value.
    #[must_use]
    pub const fn requires_expected(&self) -> bool {
        matches!(
            self,
            Self::Equal
                | Self::ListLengthEqual
                | Self::StartsWith
                | Self::EqualToValue
                | Self::ErrorContains
        )
    }

    /// Returns true if the operation reads a module output.
    #[must_use]
    pub const fn reads_output(&self) -> bool {
        matches!(
            self,
            Self::NotEmpty
                | Self::Empty
                | Self::Equal
                | Self::NotFound
                | Self::ListLengthEqual
                | Self::StartsWith
                | Self::CheckFunctionWithOutput
        )
    }
}

impl fmt::Display for AssertOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotEmpty => "not_empty",
            Self::Empty => "empty",
            Self::Equal => "equal",
            Self::NotFound => "not_found",
            Self::ListLengthEqual => "list_length_equal",
            Self::StartsWith => "starts_with",
            Self::CheckFunctionWithOutput => "check_function_with_output",
            Self::CheckFunctionWithValue => "check_function_with_value",
            Self::EqualToValue => "equal_to_value",
            Self::ErrorContains => "error_contains",
            Self::Unrecognized(name) => name,
        };
        f.write_str(s)
    }
}

impl AssertExpression {
    /// Creates an expression with no expected value, predicate or message.
    #[must_use]
    pub fn new(output_name: impl Into<String>, operation: AssertOperation) -> Self {
        Self {
            output_name: output_name.into(),
            operation,
            expected_value: None,
            message: String::new(),
            check: None,
            tested_value: String::new(),
        }
    }

    /// Output must not be empty.
    #[must_use]
    pub fn not_empty(output_name: impl Into<String>) -> Self {
        Self::new(output_name, AssertOperation::NotEmpty)
    }

    /// Output must be empty.
    #[must_use]
    pub fn empty(output_name: impl Into<String>) -> Self {
        Self::new(output_name, AssertOperation::Empty)
    }

    /// Output must equal `expected`.
    #[must_use]
    pub fn equal(output_name: impl Into<String>, expected: impl Into<serde_json::Value>) -> Self {
        Self::new(output_name, AssertOperation::Equal).with_expected(expected)
    }

    /// Output must not exist.
    #[must_use]
    pub fn not_found(output_name: impl Into<String>) -> Self {
        Self::new(output_name, AssertOperation::NotFound)
    }

    /// Output list must have `len` items.
    #[must_use]
    pub fn list_length_equal(output_name: impl Into<String>, len: usize) -> Self {
        Self::new(output_name, AssertOperation::ListLengthEqual).with_expected(len)
    }

    /// Output must start with `prefix`.
    #[must_use]
    pub fn starts_with(output_name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::new(output_name, AssertOperation::StartsWith).with_expected(prefix.into())
    }

    /// `check` must hold for the output.
    #[must_use]
    pub fn check_output<F>(output_name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        let mut expr = Self::new(output_name, AssertOperation::CheckFunctionWithOutput);
        expr.check = Some(Arc::new(check));
        expr
    }

    /// `check` must hold for `value`.
    #[must_use]
    pub fn check_value<F>(value: impl Into<String>, check: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        let mut expr = Self::new("", AssertOperation::CheckFunctionWithValue);
        expr.tested_value = value.into();
        expr.check = Some(Arc::new(check));
        expr
    }

    /// `value` must equal `expected`.
    #[must_use]
    pub fn equal_to_value(value: impl Into<String>, expected: impl Into<serde_json::Value>) -> Self {
        let mut expr = Self::new("", AssertOperation::EqualToValue).with_expected(expected);
        expr.tested_value = value.into();
        expr
    }

    /// The tool error must contain `fragment`.
    #[must_use]
    pub fn error_contains(fragment: impl Into<String>) -> Self {
        Self::new("", AssertOperation::ErrorContains).with_expected(fragment.into())
    }

    /// Sets the expected value.
    #[must_use]
    pub fn with_expected(mut self, expected: impl Into<serde_json::Value>) -> Self {
        self.expected_value = Some(expected.into());
        self
    }

    /// Sets the failure message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Checks the invariants between the operation and its fields.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated invariant.
    pub fn validate(&self) -> Result<(), String> {
        if self.operation.requires_check() && self.check.is_none() {
            return Err(format!("operation {} requires a check predicate", self.operation));
        }
        if self.operation.requires_expected() && self.expected_value.is_none() {
            return Err(format!("operation {} requires an expected value", self.operation));
        }
        Ok(())
    }

    /// Subject used when reporting on this expression.
    fn subject(&self) -> String {
        if !self.output_name.is_empty() {
            self.output_name.clone()
        } else if !self.tested_value.is_empty() {
            format!("value `{}`", self.tested_value)
        } else {
            self.operation.to_string()
        }
    }

    /// Expected value as text: strings raw, anything else as JSON.
    fn expected_text(&self) -> String {
        match &self.expected_value {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    fn expected_len(&self) -> Option<usize> {
        match &self.expected_value {
            Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
            Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn finding(&self, kind: FindingKind, detail: impl fmt::Display) -> Finding {
        let message = if self.message.is_empty() {
            detail.to_string()
        } else {
            format!("{}: {detail}", self.message)
        };
        Finding::new(kind, self.subject(), message)
    }

    fn mismatch(&self, expected: impl fmt::Display, actual: impl fmt::Display) -> Finding {
        self.finding(
            FindingKind::Assertion,
            format_args!(
                "{} failed for `{}`: expected `{expected}`, actual `{actual}`",
                self.operation,
                self.subject()
            ),
        )
    }

    fn unknown_operation(&self) -> Finding {
        self.finding(
            FindingKind::UnknownOperation,
            format_args!("Unknown operation `{}` used in assert expressions list", self.operation),
        )
    }

    /// Runs the predicate, treating a panic as a failed check.
    fn run_check(&self, value: &str) -> bool {
        let Some(check) = &self.check else {
            return false;
        };
        catch_unwind(AssertUnwindSafe(|| check(value))).unwrap_or_else(|_| {
            warn!("Check predicate for {} panicked", self.subject());
            false
        })
    }
}

impl fmt::Debug for AssertExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssertExpression")
            .field("output_name", &self.output_name)
            .field("operation", &self.operation)
            .field("expected_value", &self.expected_value)
            .field("message", &self.message)
            .field("check", &self.check.as_ref().map(|_| "<fn>"))
            .field("tested_value", &self.tested_value)
            .finish()
    }
}

impl AssertionEngine {
    /// Creates a new assertion engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Evaluates every expression against the module's current outputs.
    ///
    /// `ErrorContains` is not valid here and is reported as an unknown
    /// operation, like any unrecognized operation.
    pub async fn assert_outputs<P>(
        &self,
        provisioner: &P,
        options: &ToolOptions,
        assertions: &[AssertExpression],
    ) -> Vec<Finding>
    where
        P: Provisioner + ?Sized,
    {
        let mut findings = Vec::new();
        for expr in assertions {
            debug!("Asserting {} on {}", expr.operation, expr.subject());
            if let Some(finding) = Self::evaluate_output(provisioner, options, expr).await {
                warn!("{finding}");
                findings.push(finding);
            }
        }
        findings
    }

    /// Evaluates every expression against the error of a failed tool run.
    ///
    /// Only `ErrorContains` is valid here; anything else is reported as an
    /// unknown operation.
    #[must_use]
    pub fn assert_errors(&self, error: &ToolError, assertions: &[AssertExpression]) -> Vec<Finding> {
        let text = error.tool_message();
        let mut findings = Vec::new();
        for expr in assertions {
            let finding = match (&expr.operation, expr.validate()) {
                (_, Err(e)) => Some(expr.finding(FindingKind::InvalidAssertion, e)),
                (AssertOperation::ErrorContains, Ok(())) => {
                    let fragment = expr.expected_text();
                    (!text.contains(&fragment)).then(|| {
                        expr.mismatch(format_args!("error containing {fragment:?}"), text.trim())
                    })
                }
                (_, Ok(())) => Some(expr.unknown_operation()),
            };
            if let Some(finding) = finding {
                warn!("{finding}");
                findings.push(finding);
            }
        }
        findings
    }

    async fn evaluate_output<P>(
        provisioner: &P,
        options: &ToolOptions,
        expr: &AssertExpression,
    ) -> Option<Finding>
    where
        P: Provisioner + ?Sized,
    {
        if matches!(
            expr.operation,
            AssertOperation::ErrorContains | AssertOperation::Unrecognized(_)
        ) {
            return Some(expr.unknown_operation());
        }
        if let Err(e) = expr.validate() {
            return Some(expr.finding(FindingKind::InvalidAssertion, e));
        }

        let name = expr.output_name.as_str();
        match &expr.operation {
            AssertOperation::NotFound => {
                let marker = format!("Output \"{name}\" not found");
                match provisioner.read_output(options, name).await {
                    Err(e) if e.to_string().contains(&marker) || e.tool_message().contains(&marker) => {
                        None
                    }
                    Err(e) => Some(expr.mismatch(format_args!("error containing {marker:?}"), e)),
                    Ok(value) => Some(expr.mismatch("output to be absent", format_args!("{value:?}"))),
                }
            }
            AssertOperation::ListLengthEqual => {
                let values = match provisioner.read_output_list(options, name).await {
                    Ok(values) => values,
                    Err(e) => return Some(read_failure(expr, &e)),
                };
                match expr.expected_len() {
                    Some(len) if len == values.len() => None,
                    Some(len) => Some(expr.mismatch(len, values.len())),
                    None => Some(expr.finding(
                        FindingKind::InvalidAssertion,
                        format_args!("expected value `{}` is not a length", expr.expected_text()),
                    )),
                }
            }
            AssertOperation::CheckFunctionWithValue => (!expr.run_check(&expr.tested_value))
                .then(|| expr.mismatch("check to hold", format_args!("check rejected {:?}", expr.tested_value))),
            AssertOperation::EqualToValue => {
                let expected = expr.expected_text();
                (expr.tested_value != expected).then(|| expr.mismatch(expected, &expr.tested_value))
            }
            operation => {
                let value = match provisioner.read_output(options, name).await {
                    Ok(value) => value,
                    Err(e) => return Some(read_failure(expr, &e)),
                };
                Self::check_text(expr, operation, &value)
            }
        }
    }

    /// Checks for operations that compare a single text output.
    fn check_text(expr: &AssertExpression, operation: &AssertOperation, value: &str) -> Option<Finding> {
        match operation {
            AssertOperation::NotEmpty => value
                .is_empty()
                .then(|| expr.mismatch("a non-empty value", "\"\"")),
            AssertOperation::Empty => {
                (!value.is_empty()).then(|| expr.mismatch("an empty value", value))
            }
            AssertOperation::Equal => {
                let expected = expr.expected_text();
                (value != expected).then(|| expr.mismatch(expected, value))
            }
            AssertOperation::StartsWith => {
                let prefix = expr.expected_text();
                (!value.starts_with(&prefix))
                    .then(|| expr.mismatch(format_args!("prefix {prefix:?}"), value))
            }
            AssertOperation::CheckFunctionWithOutput => (!expr.run_check(value))
                .then(|| expr.mismatch("check to hold", format_args!("check rejected {value:?}"))),
            _ => Some(expr.unknown_operation()),
        }
    }
}

fn read_failure(expr: &AssertExpression, error: &ToolError) -> Finding {
    expr.finding(
        FindingKind::Assertion,
        format_args!("failed to read output `{}`: {error}", expr.output_name),
    )
}
