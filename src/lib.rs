// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Terra Skeleton
//!
//! Lifecycle and change-assertion tests for Terraform modules.
//!
//! ## Overview
//!
//! A test drives one module through a full lifecycle against real
//! infrastructure:
//!
//! - Deploy the module and assert on its outputs
//! - Check that a second plan is empty (idempotence)
//! - Apply change scenarios and assert the exact set of resource changes
//! - Destroy everything, even when a step fails or panics
//!
//! A plan-only variant checks that invalid inputs fail with the expected
//! error, and golden files pin the resource addresses a plan must contain.
//!
//! ## Modules
//!
//! - [`tool`]: Provisioning tool contract and the Terraform CLI adapter
//! - [`assertion`]: Output and error assertions
//! - [`verify`]: Planned change verification
//! - [`lifecycle`]: Lifecycle orchestration and file staging
//! - [`golden`]: Golden plan files
//! - [`names`]: Random resource names
//! - [`config`]: Test-suite files for the command-line runner
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```no_run
//! use terra_skeleton::{AssertExpression, Lifecycle, TerraformCli, ToolOptions};
//!
//! # async fn example() {
//! let tool = TerraformCli::new();
//! let report = Lifecycle::new(&tool)
//!     .deploy_check_outputs_verify_changes(
//!         ToolOptions::default_for("modules/vnet"),
//!         vec![AssertExpression::starts_with("address_space", "10.")],
//!     )
//!     .await;
//! report.assert_passed();
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod assertion;
pub mod cli;
pub mod config;
pub mod error;
pub mod golden;
pub mod lifecycle;
pub mod names;
pub mod report;
pub mod tool;
pub mod verify;

// ============================================================================
// Re-exports
// ============================================================================

pub use assertion::{AssertExpression, AssertOperation, AssertionEngine, CheckFn};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, SuiteConfig};
pub use error::{Result, SkeletonError};
pub use golden::GoldenPlan;
pub use lifecycle::{AdditionalChangesAfterDeployment, Lifecycle, LifecycleSpec, ensure_from_sample};
pub use names::{RandomNames, generate_azure_random_names};
pub use report::{Finding, FindingKind, RunReport, TeardownStatus};
pub use tool::{Action, PlanResult, Provisioner, TerraformCli, ToolOptions};
pub use verify::{ChangedResource, ExpectedChanges};
