//! Structured plan results.
//!
//! A [`PlanResult`] is built from the tool's machine-readable plan
//! (`show -json`). The lifecycle only ever reads it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

/// An intended action on one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// Resource will be created.
    Create,
    /// Resource will be updated in place.
    Update,
    /// Resource will be destroyed.
    Delete,
    /// Resource is already in its declared state.
    NoOp,
    /// Data source will be read. Never counts as a change.
    Read,
}

/// Planned change for one resource address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceChange {
    /// Resource address.
    pub address: String,
    /// Intended actions, in the order the tool reported them.
    pub actions: Vec<Action>,
}

/// A structured plan: planned values and intended actions, by address.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanResult {
    /// Planned value snapshot for every resource.
    pub resource_planned_values: BTreeMap<String, serde_json::Value>,
    /// Intended actions for every resource.
    pub resource_changes: BTreeMap<String, ResourceChange>,
}

/// Raw `show -json` document (only the parts the skeleton reads).
#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(default)]
    planned_values: Option<RawPlannedValues>,
    #[serde(default)]
    resource_changes: Vec<RawResourceChange>,
}

#[derive(Debug, Deserialize)]
struct RawPlannedValues {
    #[serde(default)]
    root_module: Option<RawModule>,
}

#[derive(Debug, Deserialize)]
struct RawModule {
    #[serde(default)]
    resources: Vec<RawResource>,
    #[serde(default)]
    child_modules: Vec<RawModule>,
}

#[derive(Debug, Deserialize)]
struct RawResource {
    address: String,
    #[serde(default)]
    values: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawResourceChange {
    address: String,
    change: RawChange,
}

#[derive(Debug, Deserialize)]
struct RawChange {
    actions: Vec<Action>,
}

impl PlanResult {
    /// Parses the tool's JSON plan representation.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the document does not have the plan shape.
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        let raw: RawPlan = serde_json::from_str(json)?;

        let mut resource_planned_values = BTreeMap::new();
        if let Some(root) = raw.planned_values.and_then(|p| p.root_module) {
            collect_planned_values(root, &mut resource_planned_values);
        }

        let resource_changes: BTreeMap<String, ResourceChange> = raw
            .resource_changes
            .into_iter()
            .map(|rc| {
                (
                    rc.address.clone(),
                    ResourceChange {
                        address: rc.address,
                        actions: rc.change.actions,
                    },
                )
            })
            .collect();

        debug!(
            "Parsed plan: {} planned values, {} resource changes",
            resource_planned_values.len(),
            resource_changes.len()
        );

        Ok(Self {
            resource_planned_values,
            resource_changes,
        })
    }

    /// Adds a resource change (builder style, mostly for tests and fakes).
    #[must_use]
    pub fn with_change(mut self, address: impl Into<String>, actions: &[Action]) -> Self {
        let address = address.into();
        self.resource_planned_values
            .entry(address.clone())
            .or_insert(serde_json::Value::Null);
        self.resource_changes.insert(
            address.clone(),
            ResourceChange {
                address,
                actions: actions.to_vec(),
            },
        );
        self
    }

    /// Returns true if the plan contains the given planned-values address.
    #[must_use]
    pub fn has_planned_value(&self, address: &str) -> bool {
        self.resource_planned_values.contains_key(address)
    }

    /// Returns true if the plan contains the given resource-changes address.
    #[must_use]
    pub fn has_resource_change(&self, address: &str) -> bool {
        self.resource_changes.contains_key(address)
    }
}

fn collect_planned_values(module: RawModule, out: &mut BTreeMap<String, serde_json::Value>) {
    for resource in module.resources {
        out.insert(resource.address, resource.values);
    }
    for child in module.child_modules {
        collect_planned_values(child, out);
    }
}

impl Action {
    /// Returns true for actions that mutate infrastructure.
    #[must_use]
    pub const fn is_change(self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }

    /// Canonical name of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::NoOp => "no-op",
            Self::Read => "read",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "no-op" | "noop" | "no_op" => Ok(Self::NoOp),
            "read" => Ok(Self::Read),
            _ => Err(ConfigError::UnknownAction {
                name: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN_JSON: &str = r#"{
        "format_version": "1.2",
        "planned_values": {
            "root_module": {
                "resources": [
                    {"address": "azurerm_resource_group.this", "values": {"name": "rg"}}
                ],
                "child_modules": [
                    {
                        "address": "module.vnet",
                        "resources": [
                            {"address": "module.vnet.azurerm_virtual_network.this", "values": {}}
                        ],
                        "child_modules": [
                            {
                                "address": "module.vnet.module.nsg",
                                "resources": [
                                    {"address": "module.vnet.module.nsg.azurerm_network_security_group.this[\"mgmt\"]"}
                                ]
                            }
                        ]
                    }
                ]
            }
        },
        "resource_changes": [
            {"address": "azurerm_resource_group.this", "change": {"actions": ["no-op"]}},
            {"address": "module.vnet.azurerm_virtual_network.this", "change": {"actions": ["delete", "create"]}}
        ]
    }"#;

    #[test]
    fn test_parse_plan_walks_child_modules() {
        let plan = PlanResult::from_json(PLAN_JSON).unwrap();

        assert_eq!(plan.resource_planned_values.len(), 3);
        assert!(plan.has_planned_value(
            "module.vnet.module.nsg.azurerm_network_security_group.this[\"mgmt\"]"
        ));
        assert_eq!(
            plan.resource_changes["module.vnet.azurerm_virtual_network.this"].actions,
            vec![Action::Delete, Action::Create]
        );
    }

    #[test]
    fn test_parse_empty_plan() {
        let plan = PlanResult::from_json(r#"{"format_version": "1.2"}"#).unwrap();
        assert!(plan.resource_changes.is_empty());
        assert!(plan.resource_planned_values.is_empty());
    }

    #[test]
    fn test_action_from_str() {
        assert_eq!("no-op".parse::<Action>().unwrap(), Action::NoOp);
        assert_eq!("Create".parse::<Action>().unwrap(), Action::Create);
        assert!("replace".parse::<Action>().is_err());
    }
}
