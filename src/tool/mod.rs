//! Provisioning tool adapter.
//!
//! This module defines the contract the lifecycle uses to drive the external
//! provisioning tool, the options passed to every call, the structured plan
//! model and the Terraform CLI implementation.

mod options;
mod plan;
mod provisioner;
mod terraform;

#[cfg(test)]
pub(crate) mod fake;

pub use options::{DEFAULT_BINARY, DEFAULT_PLAN_FILE, RetryPolicy, ToolOptions};
pub use plan::{Action, PlanResult, ResourceChange};
pub use provisioner::Provisioner;
pub use terraform::TerraformCli;

