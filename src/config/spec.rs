//! Test-suite specification types.
//!
//! This module defines the structs that map to the `skeleton.test.yaml`
//! file. A suite describes one module under test and the lifecycle to run
//! against it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assertion::{AssertExpression, AssertOperation};
use crate::error::ConfigError;
use crate::lifecycle::{AdditionalChangesAfterDeployment, LifecycleSpec};
use crate::names::generate_azure_random_names;
use crate::tool::{Action, DEFAULT_BINARY, RetryPolicy, ToolOptions};
use crate::verify::ChangedResource;

/// The root structure of a test-suite file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuiteConfig {
    /// Module under test.
    pub module: ModuleConfig,
    /// Provisioning tool settings.
    #[serde(default)]
    pub tool: ToolConfig,
    /// Files created from samples before the run.
    #[serde(default)]
    pub bootstrap: Vec<BootstrapFile>,
    /// Assertions on outputs after deployment.
    #[serde(default)]
    pub assertions: Vec<AssertionConfig>,
    /// Assertions on the error of a plan that is expected to fail.
    #[serde(default)]
    pub expect_errors: Vec<AssertionConfig>,
    /// Failure message when a plan does not behave as `expect_errors` says.
    #[serde(default = "default_no_errors_message")]
    pub no_errors_message: String,
    /// Whether a second plan after deployment must be empty.
    #[serde(default = "default_true")]
    pub check_no_changes: bool,
    /// Whether to destroy the infrastructure at the end.
    #[serde(default = "default_true")]
    pub destroy: bool,
    /// Change scenarios run after deployment.
    #[serde(default)]
    pub additional_changes: Vec<AdditionalChangesConfig>,
    /// Golden plan file, relative to the module directory.
    #[serde(default)]
    pub golden: Option<PathBuf>,
}

/// The module under test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleConfig {
    /// Module directory, relative to the suite file.
    #[serde(default = "default_module_dir")]
    pub dir: PathBuf,
    /// Variable files, relative to the module directory.
    #[serde(default)]
    pub var_files: Vec<PathBuf>,
    /// Variables.
    #[serde(default)]
    pub vars: BTreeMap<String, serde_json::Value>,
    /// Plan output file.
    #[serde(default)]
    pub plan_file: Option<PathBuf>,
    /// Whether to hold the state lock.
    #[serde(default = "default_true")]
    pub lock: bool,
    /// Whether `init` upgrades providers.
    #[serde(default = "default_true")]
    pub upgrade: bool,
    /// Whether `-var` arguments come after `-var-file` arguments.
    #[serde(default = "default_true")]
    pub set_vars_after_var_files: bool,
    /// Random resource names injected as variables.
    #[serde(default)]
    pub random_names: Option<RandomNamesKind>,
}

/// Which random name set to generate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RandomNamesKind {
    /// Azure prefix, resource group and storage account names.
    Azure,
}

/// Provisioning tool settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolConfig {
    /// Tool binary name or path.
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Retries for transient errors.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Seconds between retries.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    /// Per-command timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Extra environment variables for the tool.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// A file copied from a sample when missing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BootstrapFile {
    /// Sample file, relative to the module directory.
    pub sample: PathBuf,
    /// File to create, relative to the module directory.
    pub active: PathBuf,
}

/// One assertion as written in the suite file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssertionConfig {
    /// Output to read.
    #[serde(default)]
    pub output: String,
    /// Operation name, e.g. `starts_with`.
    pub operation: String,
    /// Expected value.
    #[serde(default)]
    pub expected: Option<serde_json::Value>,
    /// Failure message.
    #[serde(default)]
    pub message: String,
    /// Tested value, for value operations.
    #[serde(default)]
    pub value: String,
}

/// One change scenario as written in the suite file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AdditionalChangesConfig {
    /// Variable overrides.
    #[serde(default)]
    pub vars: BTreeMap<String, serde_json::Value>,
    /// Replacement variable files.
    #[serde(default)]
    pub var_files: Vec<PathBuf>,
    /// File with extra Terraform code, without the `.tf` extension.
    #[serde(default)]
    pub tf_code: Option<PathBuf>,
    /// Expected resource changes.
    #[serde(default)]
    pub changed_resources: Vec<ChangedResourceConfig>,
}

/// An expected resource change as written in the suite file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangedResourceConfig {
    /// Resource address.
    pub name: String,
    /// Action name: `create`, `update` or `delete`.
    pub action: String,
}

fn default_no_errors_message() -> String {
    String::from("Plan did not behave as expected")
}

const fn default_true() -> bool {
    true
}

fn default_module_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_binary() -> String {
    String::from(DEFAULT_BINARY)
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_retry_delay() -> u64 {
    5
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
            timeout_secs: None,
            env: BTreeMap::new(),
        }
    }
}

impl SuiteConfig {
    /// Module directory resolved against the suite file's directory.
    #[must_use]
    pub fn module_dir(&self, base_dir: &Path) -> PathBuf {
        if self.module.dir.is_absolute() {
            self.module.dir.clone()
        } else {
            base_dir.join(&self.module.dir)
        }
    }

    /// Builds tool options for the module.
    ///
    /// Random names, when enabled, are added as variables unless the suite
    /// sets those variables itself.
    #[must_use]
    pub fn tool_options(&self, base_dir: &Path) -> ToolOptions {
        let mut options = ToolOptions::default_for(self.module_dir(base_dir));
        options.var_files.clone_from(&self.module.var_files);
        options.plan_file.clone_from(&self.module.plan_file);
        options.lock = self.module.lock;
        options.upgrade = self.module.upgrade;
        options.set_vars_after_var_files = self.module.set_vars_after_var_files;
        options.binary.clone_from(&self.tool.binary);
        options.env.clone_from(&self.tool.env);
        options.timeout = self.tool.timeout_secs.map(Duration::from_secs);
        options.retry = RetryPolicy {
            max_retries: self.tool.max_retries,
            time_between_retries: Duration::from_secs(self.tool.retry_delay_secs),
            ..RetryPolicy::default()
        };

        if let Some(RandomNamesKind::Azure) = self.module.random_names {
            let names = generate_azure_random_names();
            debug!("Generated random names with prefix {}", names.name_prefix);
            options.merge_vars(&names.as_vars());
        }
        options.merge_vars(&self.module.vars);
        options
    }

    /// Output assertions.
    #[must_use]
    pub fn output_assertions(&self) -> Vec<AssertExpression> {
        self.assertions.iter().map(AssertionConfig::to_expression).collect()
    }

    /// Error assertions for the plan-only run.
    #[must_use]
    pub fn error_assertions(&self) -> Vec<AssertExpression> {
        self.expect_errors.iter().map(AssertionConfig::to_expression).collect()
    }

    /// Builds the lifecycle to run.
    ///
    /// # Errors
    ///
    /// Returns an error if an expected change names an unknown action.
    pub fn lifecycle_spec(&self) -> Result<LifecycleSpec, ConfigError> {
        let additional_changes = self
            .additional_changes
            .iter()
            .map(AdditionalChangesConfig::to_scenario)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(LifecycleSpec {
            assertions: self.output_assertions(),
            check_no_changes: self.check_no_changes,
            additional_changes,
            destroy_at_end: self.destroy,
        })
    }
}

impl AssertionConfig {
    /// Converts to an assertion expression.
    #[must_use]
    pub fn to_expression(&self) -> AssertExpression {
        let mut expr = AssertExpression::new(&self.output, AssertOperation::parse(&self.operation))
            .with_message(&self.message);
        expr.expected_value.clone_from(&self.expected);
        expr.tested_value.clone_from(&self.value);
        expr
    }
}

impl AdditionalChangesConfig {
    /// Converts to a change scenario.
    ///
    /// # Errors
    ///
    /// Returns an error if an expected change names an unknown action.
    pub fn to_scenario(&self) -> Result<AdditionalChangesAfterDeployment, ConfigError> {
        let changed_resources = self
            .changed_resources
            .iter()
            .map(ChangedResourceConfig::to_changed_resource)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AdditionalChangesAfterDeployment {
            additional_vars_values: self.vars.clone(),
            use_var_files: self.var_files.clone(),
            file_name_with_tf_code: self.tf_code.clone(),
            changed_resources,
        })
    }
}

impl ChangedResourceConfig {
    /// Converts to an expected change.
    ///
    /// # Errors
    ///
    /// Returns an error if the action is unknown.
    pub fn to_changed_resource(&self) -> Result<ChangedResource, ConfigError> {
        let action: Action = self.action.parse()?;
        Ok(ChangedResource::new(&self.name, action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn suite(yaml: &str) -> SuiteConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = suite("module: {}\n");
        assert_eq!(config.module.dir, PathBuf::from("."));
        assert!(config.check_no_changes);
        assert!(config.destroy);
        assert_eq!(config.tool.binary, "terraform");
        assert_eq!(config.tool.max_retries, 3);
    }

    #[test]
    fn test_tool_options() {
        let config = suite(
            r"
module:
  dir: modules/vnet
  var_files: [example.tfvars]
  vars:
    location: eastus
    name_prefix: fixed-
  random_names: azure
  lock: false
tool:
  binary: tofu
  max_retries: 1
  timeout_secs: 600
",
        );

        let options = config.tool_options(Path::new("/repo"));
        assert_eq!(options.working_dir, PathBuf::from("/repo/modules/vnet"));
        assert_eq!(options.binary, "tofu");
        assert!(!options.lock);
        assert_eq!(options.retry.max_retries, 1);
        assert_eq!(options.timeout, Some(Duration::from_secs(600)));
        assert_eq!(options.vars.get("name_prefix"), Some(&json!("fixed-")));
        assert!(options.vars.contains_key("resource_group_name"));
    }

    #[test]
    fn test_lifecycle_spec() {
        let config = suite(
            r#"
module: {}
assertions:
  - output: public_ip
    operation: starts_with
    expected: "1.2"
additional_changes:
  - vars: {subnet_count: 3}
    tf_code: extra_subnet
    changed_resources:
      - name: 'module.vnet.azurerm_subnet.this["management"]'
        action: create
"#,
        );

        let spec = config.lifecycle_spec().unwrap();
        assert_eq!(spec.assertions[0].operation, AssertOperation::StartsWith);
        assert_eq!(spec.additional_changes[0].changed_resources[0].action, Action::Create);
        assert_eq!(
            spec.additional_changes[0].file_name_with_tf_code,
            Some(PathBuf::from("extra_subnet"))
        );
    }

    #[test]
    fn test_unknown_action_is_an_error() {
        let config = suite(
            r"
module: {}
additional_changes:
  - changed_resources:
      - name: azurerm_subnet.this
        action: replace
",
        );
        assert!(matches!(
            config.lifecycle_spec(),
            Err(ConfigError::UnknownAction { .. })
        ));
    }
}
