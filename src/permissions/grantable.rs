use std::collections::BTreeMap;

use crate::permissions::glob;
use crate::permissions::types::{GrantedPermission, Permission};
use crate::permissions::PERMISSION_GRANT;

/// Expand grant-permission delegations against the permission catalog.
///
/// Each delegation argument reads `<permission-glob>[/<argument-pattern>]`,
/// split on the first `/`; a missing argument pattern means `*`. Every
/// catalog permission whose name matches the glob becomes grantable with
/// that argument pattern. Entries that are not delegations are ignored.
///
/// The result is de-duplicated and sorted by `(permission name, argument)`.
pub fn filter_grantable_permissions<'a, I>(
    delegations: I,
    catalog: &BTreeMap<String, Permission>,
) -> Vec<(Permission, String)>
where
    I: IntoIterator<Item = &'a GrantedPermission>,
{
    let mut grantable: BTreeMap<(String, String), Permission> = BTreeMap::new();

    for delegation in delegations {
        if delegation.name != PERMISSION_GRANT {
            continue;
        }
        let (name_glob, argument) = match delegation.argument.split_once('/') {
            Some((name_glob, argument)) => (name_glob, argument),
            None => (delegation.argument.as_str(), "*"),
        };

        for (name, permission) in catalog {
            if glob::matches(name_glob, name) {
                grantable
                    .entry((name.clone(), argument.to_string()))
                    .or_insert_with(|| permission.clone());
            }
        }
    }

    grantable
        .into_iter()
        .map(|((_, argument), permission)| (permission, argument))
        .collect()
}

/// Index permissions by name, the catalog shape the reducer expects.
pub fn catalog_by_name(permissions: &[Permission]) -> BTreeMap<String, Permission> {
    permissions
        .iter()
        .map(|p| (p.name.clone(), p.clone()))
        .collect()
}
