use std::collections::{BTreeMap, BTreeSet};

use crate::permissions::owners::OwnerMap;

/// Collapse an owner map into the grantable arguments of each permission,
/// reduced to the least permissive form.
///
/// - Restricted permission with at least one specific argument: only the
///   specific arguments, wildcard ownership is hidden.
/// - Only specific arguments: all of them.
/// - Otherwise a wildcard is present and covers everything: `["*"]`.
pub fn grantable_arguments(
    owners: &OwnerMap,
    restricted_permissions: &[String],
) -> BTreeMap<String, Vec<String>> {
    owners
        .permissions()
        .map(|(permission, by_argument)| {
            let restricted = restricted_permissions.iter().any(|r| r == permission);
            let arguments = reduce_arguments(restricted, by_argument.keys().map(String::as_str));
            (permission.to_string(), arguments)
        })
        .collect()
}

fn reduce_arguments<'a>(restricted: bool, arguments: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut has_wildcard = false;
    let mut specific = BTreeSet::new();
    for argument in arguments {
        if argument == "*" {
            has_wildcard = true;
        } else {
            specific.insert(argument.to_string());
        }
    }

    if (restricted && !specific.is_empty()) || !has_wildcard {
        specific.into_iter().collect()
    } else {
        vec!["*".to_string()]
    }
}
