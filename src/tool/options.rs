//! Options passed to every provisioning tool invocation.
//!
//! There is no implicit global default: callers build options through
//! [`ToolOptions::default_for`] (or [`Default`]) and pass them explicitly.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tracing::warn;

/// Default provisioning tool binary.
pub const DEFAULT_BINARY: &str = "terraform";

/// Plan file used by the lifecycle when it needs a plan artifact to inspect.
pub const DEFAULT_PLAN_FILE: &str = "test.plan";

/// Default number of retries for transient tool errors.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default pause between retries, in seconds.
const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// Transient errors the tool reports while talking to registries, plugins or
/// state backends. Pattern → description.
const DEFAULT_RETRYABLE_ERRORS: &[(&str, &str)] = &[
    (
        "(?s).*read: connection reset by peer.*",
        "Failed to reach remote endpoint.",
    ),
    ("(?s).*transport is closing.*", "Failed to reach remote API."),
    (
        "(?s).*unable to verify signature.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        "(?s).*unable to verify checksum.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        "(?s).*no provider exists with the given name.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        "(?s).*registry service is unreachable.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        "(?s).*Error installing provider.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        "(?s).*Failed to query available provider packages.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        "(?s).*timeout while waiting for plugin to start.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        "(?s).*timed out waiting for server handshake.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        "(?s).*could not query provider registry for.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        "(?s).*Error acquiring the state lock.*",
        "State is locked by another operation.",
    ),
];

/// Retry policy for transient tool errors.
#[derive(Debug, Clone, Serialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Pause between attempts.
    pub time_between_retries: Duration,
    /// Retryable error patterns (regex → description).
    pub retryable_errors: BTreeMap<String, String>,
}

/// Options for one working directory.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOptions {
    /// Working directory containing the module under test.
    pub working_dir: PathBuf,
    /// Variable files, passed in order.
    pub var_files: Vec<PathBuf>,
    /// Variables passed with `-var`.
    pub vars: BTreeMap<String, serde_json::Value>,
    /// Plan output file, when a plan artifact is needed for inspection.
    pub plan_file: Option<PathBuf>,
    /// Whether to hold the state lock.
    pub lock: bool,
    /// Whether `init` upgrades providers in place.
    pub upgrade: bool,
    /// Whether `-var` arguments come after `-var-file` arguments.
    pub set_vars_after_var_files: bool,
    /// Tool binary name or path.
    pub binary: String,
    /// Extra environment variables for the tool process.
    pub env: BTreeMap<String, String>,
    /// Per-command timeout.
    pub timeout: Option<Duration>,
    /// Retry policy for transient errors.
    pub retry: RetryPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            time_between_retries: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            retryable_errors: DEFAULT_RETRYABLE_ERRORS
                .iter()
                .map(|(p, d)| ((*p).to_string(), (*d).to_string()))
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            time_between_retries: Duration::ZERO,
            retryable_errors: BTreeMap::new(),
        }
    }

    /// Compiles the retryable error patterns. Invalid patterns are skipped.
    #[must_use]
    pub fn compiled_patterns(&self) -> Vec<Regex> {
        self.retryable_errors
            .keys()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("Ignoring invalid retryable error pattern {pattern:?}: {e}");
                    None
                }
            })
            .collect()
    }
}

impl Default for ToolOptions {
    fn default() -> Self {
        Self::default_for(".")
    }
}

impl ToolOptions {
    /// Default options for a working directory.
    ///
    /// Locking and provider upgrade are enabled and the default retry policy
    /// applies. Variables are set after variable files, so a `-var` always
    /// wins over a value from a file. Set `set_vars_after_var_files` to
    /// false to reverse the order.
    #[must_use]
    pub fn default_for(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            var_files: Vec::new(),
            vars: BTreeMap::new(),
            plan_file: None,
            lock: true,
            upgrade: true,
            set_vars_after_var_files: true,
            binary: String::from(DEFAULT_BINARY),
            env: BTreeMap::new(),
            timeout: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Adds a variable file.
    #[must_use]
    pub fn with_var_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.var_files.push(path.into());
        self
    }

    /// Sets a variable.
    #[must_use]
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Sets the plan output file.
    #[must_use]
    pub fn with_plan_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.plan_file = Some(path.into());
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Merges variables into the current set. Incoming values win on collision.
    pub fn merge_vars(&mut self, additional: &BTreeMap<String, serde_json::Value>) {
        for (name, value) in additional {
            self.vars.insert(name.clone(), value.clone());
        }
    }

    /// Resolves a path relative to the working directory.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    /// Builds the `-var-file` / `-var` arguments in the configured order.
    #[must_use]
    pub fn variable_args(&self) -> Vec<String> {
        let var_files = self
            .var_files
            .iter()
            .map(|f| format!("-var-file={}", f.display()));
        let vars = self
            .vars
            .iter()
            .map(|(name, value)| format!("-var={name}={}", format_var_value(value)));

        if self.set_vars_after_var_files {
            var_files.chain(vars).collect()
        } else {
            vars.chain(var_files).collect()
        }
    }
}

/// Formats a variable value for the command line.
///
/// Strings are passed raw; everything else as JSON, which the tool parses
/// as an expression.
fn format_var_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_factory() {
        let opts = ToolOptions::default_for("modules/vnet");
        assert_eq!(opts.working_dir, PathBuf::from("modules/vnet"));
        assert!(opts.lock);
        assert!(opts.upgrade);
        assert_eq!(opts.binary, "terraform");
        assert!(opts.set_vars_after_var_files);
        assert_eq!(opts.retry.max_retries, 3);
        assert!(!opts.retry.compiled_patterns().is_empty());
    }

    #[test]
    fn test_merge_vars_override_wins() {
        let mut opts = ToolOptions::default_for(".").with_var("x", 1).with_var("y", "keep");
        let mut additional = BTreeMap::new();
        additional.insert(String::from("x"), json!(2));

        opts.merge_vars(&additional);

        assert_eq!(opts.vars.get("x"), Some(&json!(2)));
        assert_eq!(opts.vars.get("y"), Some(&json!("keep")));
    }

    #[test]
    fn test_variable_args_order() {
        let mut opts = ToolOptions::default_for(".")
            .with_var_file("example.tfvars")
            .with_var("name_prefix", "ghci1-")
            .with_var("zones", json!(["1", "2"]));

        assert_eq!(
            opts.variable_args(),
            vec![
                "-var-file=example.tfvars",
                "-var=name_prefix=ghci1-",
                "-var=zones=[\"1\",\"2\"]",
            ]
        );

        opts.set_vars_after_var_files = false;
        assert_eq!(opts.variable_args()[2], "-var-file=example.tfvars");
    }
}
