//! Random resource names for test deployments.
//!
//! Every run deploys into fresh, collision-resistant names so that parallel
//! pipelines and leftovers from aborted runs never clash.

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

/// Prefix shared by all generated names.
const NAME_PREFIX: &str = "ghci";

/// A set of randomly generated Azure resource names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RandomNames {
    /// Prefix prepended to every resource name (ends with `-`).
    pub name_prefix: String,
    /// Resource group name.
    pub resource_group_name: String,
    /// Storage account name (lowercase alphanumeric only).
    pub storage_account_name: String,
}

/// Generates a set of random Azure resource names from a v4 UUID.
///
/// The UUID groups are split across the names so that they do not share
/// characters: group 3 for the prefix, groups 1-2 for the resource group and
/// groups 4-5 for the storage account.
#[must_use]
pub fn generate_azure_random_names() -> RandomNames {
    names_from_uuid(Uuid::new_v4())
}

fn names_from_uuid(id: Uuid) -> RandomNames {
    let id = id.to_string();
    let groups: Vec<&str> = id.split('-').collect();

    RandomNames {
        name_prefix: format!("{NAME_PREFIX}{}-", groups[2]),
        resource_group_name: groups[0..2].concat(),
        storage_account_name: format!("{NAME_PREFIX}{}", groups[3..5].concat()),
    }
}

impl RandomNames {
    /// Returns the names as module variables (`name_prefix`, `resource_group_name`).
    #[must_use]
    pub fn as_vars(&self) -> BTreeMap<String, serde_json::Value> {
        let mut vars = BTreeMap::new();
        vars.insert(
            String::from("name_prefix"),
            serde_json::Value::String(self.name_prefix.clone()),
        );
        vars.insert(
            String::from("resource_group_name"),
            serde_json::Value::String(self.resource_group_name.clone()),
        );
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_split_uuid_groups() {
        let id = Uuid::parse_str("1b4e28ba-2fa1-11d2-883f-0016d3cca427").unwrap();
        let names = names_from_uuid(id);

        assert_eq!(names.name_prefix, "ghci11d2-");
        assert_eq!(names.resource_group_name, "1b4e28ba2fa1");
        assert_eq!(names.storage_account_name, "ghci883f0016d3cca427");
    }

    #[test]
    fn test_generated_names_differ() {
        let a = generate_azure_random_names();
        let b = generate_azure_random_names();
        assert_ne!(a, b);
        // Azure caps storage account names at 24 characters
        assert!(a.storage_account_name.len() <= 24);
    }

    #[test]
    fn test_as_vars() {
        let names = generate_azure_random_names();
        let vars = names.as_vars();
        assert_eq!(vars.len(), 2);
        assert_eq!(
            vars.get("name_prefix").and_then(|v| v.as_str()),
            Some(names.name_prefix.as_str())
        );
    }
}
