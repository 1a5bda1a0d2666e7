//! Golden plan files.
//!
//! A golden file records which resource addresses a plan is expected to
//! contain. A later plan passes the golden check when it still contains
//! every recorded address.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::GoldenError;
use crate::report::{Finding, FindingKind};
use crate::tool::PlanResult;

/// Addresses captured from a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldenPlan {
    /// Addresses in the planned values.
    #[serde(rename = "plannedValues", default)]
    pub planned_values: Vec<String>,
    /// Addresses in the resource changes.
    #[serde(rename = "changedValues", default)]
    pub changed_values: Vec<String>,
}

impl GoldenPlan {
    /// Captures the addresses of a plan, sorted.
    #[must_use]
    pub fn capture(plan: &PlanResult) -> Self {
        // BTreeMap keys are already ordered
        Self {
            planned_values: plan.resource_planned_values.keys().cloned().collect(),
            changed_values: plan.resource_changes.keys().cloned().collect(),
        }
    }

    /// Loads a golden file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a golden plan.
    pub fn load(path: &Path) -> Result<Self, GoldenError> {
        let content = fs::read_to_string(path).map_err(|e| GoldenError::Access {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let golden: Self = serde_json::from_str(&content).map_err(|e| GoldenError::Malformed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        debug!(
            "Loaded golden file {} ({} planned, {} changed)",
            path.display(),
            golden.planned_values.len(),
            golden.changed_values.len()
        );
        Ok(golden)
    }

    /// Writes the golden file as JSON indented by four spaces.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), GoldenError> {
        let access = |message: String| GoldenError::Access {
            path: path.to_path_buf(),
            message,
        };

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser).map_err(|e| access(e.to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| access(e.to_string()))?;
        }
        fs::write(path, buf).map_err(|e| access(e.to_string()))?;

        info!("Wrote golden file {}", path.display());
        Ok(())
    }

    /// Checks that every recorded address is still present in `plan`.
    #[must_use]
    pub fn check(&self, plan: &PlanResult) -> Vec<Finding> {
        let planned = self
            .planned_values
            .iter()
            .filter(|address| !plan.has_planned_value(address))
            .map(|address| {
                Finding::new(
                    FindingKind::Golden,
                    address,
                    format!("{address} does not exist in the planned values"),
                )
            });

        let changed = self
            .changed_values
            .iter()
            .filter(|address| !plan.has_resource_change(address))
            .map(|address| {
                Finding::new(
                    FindingKind::Golden,
                    address,
                    format!("{address} does not exist in the resource changes"),
                )
            });

        planned.chain(changed).collect()
    }
}
