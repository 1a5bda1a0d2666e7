//! What a lifecycle run should do.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::assertion::AssertExpression;
use crate::verify::{ChangedResource, ExpectedChanges};

/// A change applied on top of a deployed module, with the exact set of
/// resource changes it must produce.
#[derive(Debug, Clone, Default)]
pub struct AdditionalChangesAfterDeployment {
    /// Variables merged into the run's variables. These win on collision.
    pub additional_vars_values: BTreeMap<String, serde_json::Value>,
    /// Variable files replacing the run's list, when not empty.
    pub use_var_files: Vec<PathBuf>,
    /// File with extra Terraform code, staged as `<file>.tf` for the plan.
    pub file_name_with_tf_code: Option<PathBuf>,
    /// Changes the plan must contain, nothing more or less.
    pub changed_resources: Vec<ChangedResource>,
}

impl AdditionalChangesAfterDeployment {
    /// Creates an empty scenario.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable override.
    #[must_use]
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.additional_vars_values.insert(name.into(), value.into());
        self
    }

    /// Adds a replacement variable file.
    #[must_use]
    pub fn with_var_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.use_var_files.push(path.into());
        self
    }

    /// Sets the file with extra code.
    #[must_use]
    pub fn with_tf_code(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_name_with_tf_code = Some(path.into());
        self
    }

    /// Adds an expected change.
    #[must_use]
    pub fn expect(mut self, change: ChangedResource) -> Self {
        self.changed_resources.push(change);
        self
    }

    /// Expected changes as a set.
    #[must_use]
    pub fn expected_changes(&self) -> ExpectedChanges {
        self.changed_resources.iter().cloned().collect()
    }
}

/// Phases of a full lifecycle run.
#[derive(Debug, Clone)]
pub struct LifecycleSpec {
    /// Assertions evaluated on outputs after the first apply.
    pub assertions: Vec<AssertExpression>,
    /// Whether a second plan must be empty.
    pub check_no_changes: bool,
    /// Change scenarios, in order.
    pub additional_changes: Vec<AdditionalChangesAfterDeployment>,
    /// Whether to destroy the infrastructure at the end.
    pub destroy_at_end: bool,
}

impl Default for LifecycleSpec {
    fn default() -> Self {
        Self {
            assertions: Vec::new(),
            check_no_changes: false,
            additional_changes: Vec::new(),
            destroy_at_end: true,
        }
    }
}

impl LifecycleSpec {
    /// Deploy, check outputs, destroy.
    #[must_use]
    pub fn check_outputs(assertions: Vec<AssertExpression>) -> Self {
        Self {
            assertions,
            ..Self::default()
        }
    }

    /// Deploy, check outputs, check that a second plan is empty, destroy.
    #[must_use]
    pub fn check_outputs_verify_changes(assertions: Vec<AssertExpression>) -> Self {
        Self {
            check_no_changes: true,
            ..Self::check_outputs(assertions)
        }
    }

    /// As [`Self::check_outputs_verify_changes`], then run each scenario.
    #[must_use]
    pub fn check_outputs_verify_changes_deploy_changes(
        assertions: Vec<AssertExpression>,
        additional_changes: Vec<AdditionalChangesAfterDeployment>,
    ) -> Self {
        Self {
            additional_changes,
            ..Self::check_outputs_verify_changes(assertions)
        }
    }

    /// Deploy only: no assertions and no teardown.
    #[must_use]
    pub fn deploy_only() -> Self {
        Self {
            destroy_at_end: false,
            ..Self::default()
        }
    }
}
