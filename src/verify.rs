//! Change-verification engine.
//!
//! Compares the actions in a plan against an expected set of
//! `(address, action)` pairs. Without an expectation set every change is
//! unexpected.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::report::{Finding, FindingKind};
use crate::tool::{Action, PlanResult, ResourceChange};

/// A resource expected to change, and how.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangedResource {
    /// Resource address, e.g. `module.vnet.azurerm_subnet.this["management"]`.
    pub name: String,
    /// Expected change type.
    pub action: Action,
}

/// Set of expected resource changes.
pub type ExpectedChanges = HashSet<ChangedResource>;

impl ChangedResource {
    /// Creates an expected change.
    #[must_use]
    pub fn new(name: impl Into<String>, action: Action) -> Self {
        Self {
            name: name.into(),
            action,
        }
    }
}

impl fmt::Display for ChangedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.action)
    }
}

/// Returns the change type of an action list: the last of create, update
/// or delete, or `None` when the list holds no change.
///
/// A replacement reported as `[delete, create]` is therefore a create.
#[must_use]
pub fn classify(actions: &[Action]) -> Option<Action> {
    actions.iter().rev().copied().find(|a| a.is_change())
}

/// Verifies one resource against the expected changes.
///
/// With no expectation set, any change fails. With one, the resource passes
/// when its change type is expected for its address or when its actions are
/// exactly `[no-op]`.
#[must_use]
pub fn verify_resource_change(
    change: &ResourceChange,
    expected: Option<&ExpectedChanges>,
) -> Option<Finding> {
    let change_type = classify(&change.actions);

    let Some(expected) = expected else {
        return change_type.map(|action| unexpected(&change.address, action));
    };

    if change.actions == [Action::NoOp] {
        return None;
    }

    match change_type {
        Some(action) if expected.contains(&ChangedResource::new(change.address.clone(), action)) => {
            None
        }
        Some(action) => Some(unexpected(&change.address, action)),
        None => {
            let actions: Vec<&str> = change.actions.iter().map(|a| a.as_str()).collect();
            Some(Finding::new(
                FindingKind::UnexpectedChange,
                &change.address,
                format!(
                    "Resource {} is planned with actions [{}], which are not an expected change",
                    change.address,
                    actions.join(", ")
                ),
            ))
        }
    }
}

/// Verifies every resource in the plan, then checks that every expected
/// change actually appears.
#[must_use]
pub fn verify_plan(plan: &PlanResult, expected: Option<&ExpectedChanges>) -> Vec<Finding> {
    let mut findings: Vec<Finding> = plan
        .resource_changes
        .values()
        .filter_map(|change| verify_resource_change(change, expected))
        .collect();

    if let Some(expected) = expected {
        let mut missing: Vec<&ChangedResource> = expected
            .iter()
            // Only change actions can go missing
            .filter(|e| e.action.is_change())
            .filter(|e| {
                plan.resource_changes
                    .get(&e.name)
                    .and_then(|c| classify(&c.actions))
                    != Some(e.action)
            })
            .collect();
        missing.sort_by(|a, b| a.name.cmp(&b.name).then(a.action.as_str().cmp(b.action.as_str())));

        findings.extend(missing.into_iter().map(|e| {
            Finding::new(
                FindingKind::MissingExpectedChange,
                &e.name,
                format!("Resource {} was expected to be {} but is not", e.name, past_tense(e.action)),
            )
        }));
    }

    debug!(
        "Verified {} resource changes: {} finding(s)",
        plan.resource_changes.len(),
        findings.len()
    );
    findings
}

fn unexpected(address: &str, action: Action) -> Finding {
    Finding::new(
        FindingKind::UnexpectedChange,
        address,
        format!("Resource {address} is about to be {} ({action})", past_tense(action)),
    )
}

const fn past_tense(action: Action) -> &'static str {
    match action {
        Action::Create => "created",
        Action::Update => "updated",
        Action::Delete => "deleted",
        Action::NoOp => "left unchanged",
        Action::Read => "read",
    }
}
