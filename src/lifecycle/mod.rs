//! Lifecycle orchestration.
//!
//! This module provides:
//! - [`Lifecycle`]: deploy, verify, change and destroy a module
//! - [`LifecycleSpec`] and [`AdditionalChangesAfterDeployment`]: what a run does
//! - Staging helpers for extra Terraform code and sample files

mod orchestrator;
mod scenario;
mod staging;

pub use orchestrator::Lifecycle;
pub use scenario::{AdditionalChangesAfterDeployment, LifecycleSpec};
pub use staging::{StagedFile, ensure_from_sample};
