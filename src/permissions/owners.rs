use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::permissions::errors::PermissionError;
use crate::permissions::glob;
use crate::permissions::grantable::{catalog_by_name, filter_grantable_permissions};
use crate::permissions::ports::{OwnerPluginProvider, PluginContext};
use crate::permissions::types::{Grant, GrantedPermission, Group, GroupId, Permission};
use crate::permissions::PERMISSION_ADMIN;

/// Top-level key of an [`OwnerMap`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OwnerKey {
    Permission(String),
    /// Groups that own everything through the permission-admin marker.
    GlobalOwners,
}

/// `permission -> argument pattern -> owning groups`, recomputed per call.
///
/// An argument pattern of `*` means any argument.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OwnerMap {
    entries: BTreeMap<OwnerKey, BTreeMap<String, Vec<Group>>>,
}

impl OwnerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_owner(&mut self, key: OwnerKey, argument: &str, group: Group) {
        self.entries
            .entry(key)
            .or_default()
            .entry(argument.to_string())
            .or_default()
            .push(group);
    }

    pub fn add_permission_owner(&mut self, permission: &str, argument: &str, group: Group) {
        self.add_owner(OwnerKey::Permission(permission.to_string()), argument, group);
    }

    /// Append every owner of `other`. Never replaces existing owners.
    pub fn merge(&mut self, other: OwnerMap) {
        for (key, by_argument) in other.entries {
            let target = self.entries.entry(key).or_default();
            for (argument, owners) in by_argument {
                target.entry(argument).or_default().extend(owners);
            }
        }
    }

    pub fn owners_by_argument(&self, permission: &str) -> Option<&BTreeMap<String, Vec<Group>>> {
        self.entries
            .get(&OwnerKey::Permission(permission.to_string()))
    }

    pub fn global_owners(&self) -> &[Group] {
        self.entries
            .get(&OwnerKey::GlobalOwners)
            .and_then(|by_argument| by_argument.get("*"))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Permission entries in name order; the global bucket is skipped.
    pub fn permissions(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, Vec<Group>>)> {
        self.entries.iter().filter_map(|(key, by_argument)| match key {
            OwnerKey::Permission(name) => Some((name.as_str(), by_argument)),
            OwnerKey::GlobalOwners => None,
        })
    }

    pub fn contains_permission(&self, permission: &str) -> bool {
        self.owners_by_argument(permission).is_some()
    }

    pub fn permission_count(&self) -> usize {
        self.permissions().count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build the owner map from every enabled group's grants.
///
/// Permission admins own every enabled permission under `*` (and, with
/// `separate_global`, are also listed under [`OwnerKey::GlobalOwners`]).
/// Other groups own whatever their grant-permission delegations expand to.
/// Plugin contributions are merged last and only ever add owners.
pub fn resolve_owners<I>(
    groups: &[Group],
    permissions: &[Permission],
    grants: &[Grant],
    plugin_contributions: I,
    separate_global: bool,
) -> OwnerMap
where
    I: IntoIterator<Item = OwnerMap>,
{
    let enabled: Vec<Permission> = permissions.iter().filter(|p| p.enabled).cloned().collect();
    let catalog = catalog_by_name(&enabled);

    let mut grants_by_group: HashMap<GroupId, Vec<GrantedPermission>> = HashMap::new();
    for grant in grants {
        grants_by_group
            .entry(grant.group_id)
            .or_default()
            .push(GrantedPermission::new(&grant.permission, &grant.argument));
    }

    let mut owners = OwnerMap::new();
    for group in groups.iter().filter(|g| g.enabled) {
        let group_grants = grants_by_group
            .get(&group.id)
            .map(|v| v.as_slice())
            .unwrap_or(&[]);

        if group_grants.iter().any(|g| g.name == PERMISSION_ADMIN) {
            for name in catalog.keys() {
                owners.add_permission_owner(name, "*", group.clone());
            }
            if separate_global {
                owners.add_owner(OwnerKey::GlobalOwners, "*", group.clone());
            }
            continue;
        }

        for (permission, argument) in filter_grantable_permissions(group_grants, &catalog) {
            owners.add_permission_owner(&permission.name, &argument, group.clone());
        }
    }

    for contribution in plugin_contributions {
        owners.merge(contribution);
    }

    tracing::debug!(
        permissions = owners.permission_count(),
        global_owners = owners.global_owners().len(),
        "Resolved permission owners"
    );

    owners
}

/// Every `(group, matched pattern)` allowed to approve `permission` with the
/// concrete `argument`. Ordered by pattern, then by insertion.
pub fn owners_for(owners: &OwnerMap, permission: &str, argument: &str) -> Vec<(Group, String)> {
    let Some(by_argument) = owners.owners_by_argument(permission) else {
        return Vec::new();
    };

    let mut result = Vec::new();
    for (pattern, groups) in by_argument {
        if glob::matches(pattern, argument) {
            result.extend(groups.iter().map(|g| (g.clone(), pattern.clone())));
        }
    }
    result
}

/// Ask every registered provider for its owners, in registration order.
pub async fn collect_plugin_owners(
    plugins: &[Arc<dyn OwnerPluginProvider>],
    context: &PluginContext<'_>,
) -> Result<Vec<OwnerMap>, PermissionError> {
    let mut contributions = Vec::with_capacity(plugins.len());
    for plugin in plugins {
        contributions.push(plugin.contributed_owners(context).await?);
    }
    Ok(contributions)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::permissions::grantable::tests::perm;
    use crate::permissions::PERMISSION_GRANT;

    pub(crate) fn group(id: i32, name: &str) -> Group {
        Group {
            id,
            name: name.to_string(),
            enabled: true,
            email_address: None,
        }
    }

    fn grant(group_id: i32, permission: &str, argument: &str) -> Grant {
        Grant {
            group_id,
            permission: permission.to_string(),
            argument: argument.to_string(),
            granted_on: 0,
        }
    }

    fn catalog() -> Vec<Permission> {
        vec![
            perm(1, PERMISSION_ADMIN),
            perm(2, PERMISSION_GRANT),
            perm(3, "network-east"),
            perm(4, "network-west"),
            perm(5, "storage"),
        ]
    }

    fn owner_names(owners: &[Group]) -> Vec<&str> {
        owners.iter().map(|g| g.name.as_str()).collect()
    }

    #[test]
    fn test_admin_owns_every_enabled_permission() {
        let groups = vec![group(1, "admins")];
        let grants = vec![grant(1, PERMISSION_ADMIN, "")];
        let owners = resolve_owners(&groups, &catalog(), &grants, Vec::new(), false);

        for p in catalog() {
            let by_arg = owners.owners_by_argument(&p.name).expect("owned");
            assert_eq!(by_arg.keys().collect::<Vec<_>>(), vec!["*"]);
            assert_eq!(owner_names(&by_arg["*"]), vec!["admins"]);
        }
        assert!(owners.global_owners().is_empty());
    }

    #[test]
    fn test_disabled_permission_is_not_owned() {
        let mut permissions = catalog();
        permissions[4].enabled = false;
        let groups = vec![group(1, "admins"), group(2, "storage-owners")];
        let grants = vec![
            grant(1, PERMISSION_ADMIN, ""),
            grant(2, PERMISSION_GRANT, "storage/*"),
        ];
        let owners = resolve_owners(&groups, &permissions, &grants, Vec::new(), false);
        assert!(!owners.contains_permission("storage"));
        assert!(owners.contains_permission("network-east"));
    }

    #[test]
    fn test_separate_global_bucket() {
        let groups = vec![group(1, "admins"), group(2, "net")];
        let grants = vec![
            grant(1, PERMISSION_ADMIN, ""),
            grant(2, PERMISSION_GRANT, "network-*/prod"),
        ];
        let owners = resolve_owners(&groups, &catalog(), &grants, Vec::new(), true);
        assert_eq!(owner_names(owners.global_owners()), vec!["admins"]);
        // The global bucket never shows up as a permission.
        assert_eq!(owners.permission_count(), catalog().len());

        let east = owners.owners_by_argument("network-east").unwrap();
        assert_eq!(owner_names(&east["*"]), vec!["admins"]);
        assert_eq!(owner_names(&east["prod"]), vec!["net"]);
    }

    #[test]
    fn test_disabled_group_is_ignored() {
        let mut disabled = group(1, "admins");
        disabled.enabled = false;
        let grants = vec![grant(1, PERMISSION_ADMIN, "")];
        let owners = resolve_owners(&[disabled], &catalog(), &grants, Vec::new(), true);
        assert!(owners.is_empty());
    }

    #[test]
    fn test_plugin_owners_are_additive() {
        let groups = vec![group(2, "net")];
        let grants = vec![grant(2, PERMISSION_GRANT, "network-east/prod")];

        let mut plugin = OwnerMap::new();
        plugin.add_permission_owner("network-east", "prod", group(9, "plugin-owners"));
        plugin.add_permission_owner("network-east", "dev", group(9, "plugin-owners"));

        let owners = resolve_owners(&groups, &catalog(), &grants, vec![plugin], false);
        let east = owners.owners_by_argument("network-east").unwrap();
        assert_eq!(owner_names(&east["prod"]), vec!["net", "plugin-owners"]);
        assert_eq!(owner_names(&east["dev"]), vec!["plugin-owners"]);
    }

    #[test]
    fn test_owners_for_matches_patterns() {
        let groups = vec![group(1, "admins"), group(2, "net"), group(3, "east-prod")];
        let grants = vec![
            grant(1, PERMISSION_ADMIN, ""),
            grant(2, PERMISSION_GRANT, "network-*/prod*"),
            grant(3, PERMISSION_GRANT, "network-east/prod-1"),
        ];
        let owners = resolve_owners(&groups, &catalog(), &grants, Vec::new(), false);

        let matched = owners_for(&owners, "network-east", "prod-1");
        let pairs: Vec<(&str, &str)> = matched
            .iter()
            .map(|(g, a)| (g.name.as_str(), a.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![("admins", "*"), ("net", "prod*"), ("east-prod", "prod-1")]
        );

        let matched = owners_for(&owners, "network-east", "dev");
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].0.name, "admins");

        assert!(owners_for(&owners, "unknown", "x").is_empty());
    }
}
