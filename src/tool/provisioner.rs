//! Provisioning tool contract.
//!
//! The lifecycle depends only on this trait, so the real tool can be swapped
//! for a scripted fake in tests.

use async_trait::async_trait;

use crate::error::ToolError;

use super::options::ToolOptions;
use super::plan::PlanResult;

/// Operations the lifecycle needs from the provisioning tool.
///
/// Every call blocks the run until the tool finishes or the adapter's own
/// retry policy is exhausted. Implementations retry transient errors
/// internally.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Initializes and validates the module.
    async fn validate(&self, options: &ToolOptions) -> Result<(), ToolError>;

    /// Initializes and plans, reporting only success or the tool's error.
    async fn plan(&self, options: &ToolOptions) -> Result<(), ToolError>;

    /// Initializes, plans and returns the structured plan.
    async fn plan_and_show(&self, options: &ToolOptions) -> Result<PlanResult, ToolError>;

    /// Initializes and applies. Safe to call again with the same options.
    async fn apply_all(&self, options: &ToolOptions) -> Result<(), ToolError>;

    /// Applies without re-initializing. When a plan file is set, that saved
    /// plan is applied as-is.
    async fn apply(&self, options: &ToolOptions) -> Result<(), ToolError>;

    /// Destroys everything the module manages.
    async fn destroy_all(&self, options: &ToolOptions) -> Result<(), ToolError>;

    /// Reads one output as text.
    async fn read_output(&self, options: &ToolOptions, name: &str) -> Result<String, ToolError>;

    /// Reads one output as a list of text values.
    async fn read_output_list(
        &self,
        options: &ToolOptions,
        name: &str,
    ) -> Result<Vec<String>, ToolError>;
}
