use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::permissions::types::{Grant, GrantedPermission};

/// Anything carrying a permission name and an argument.
pub trait NamedArgument {
    fn name(&self) -> &str;
    fn argument(&self) -> &str;
}

impl NamedArgument for GrantedPermission {
    fn name(&self) -> &str {
        &self.name
    }

    fn argument(&self) -> &str {
        &self.argument
    }
}

impl NamedArgument for Grant {
    fn name(&self) -> &str {
        &self.permission
    }

    fn argument(&self) -> &str {
        &self.argument
    }
}

/// Index by name, then by argument.
pub fn permission_index<T: NamedArgument>(perms: &[T]) -> HashMap<&str, HashMap<&str, &T>> {
    let mut index: HashMap<&str, HashMap<&str, &T>> = HashMap::new();
    for perm in perms {
        index
            .entry(perm.name())
            .or_default()
            .insert(perm.argument(), perm);
    }
    index
}

/// Permissions that both `perms_a` and `perms_b` grant, honouring argument
/// wildcards and unargumented grants.
///
/// Not commutative. Rules are tried in order for each item of `perms_a`:
/// exact match in B; unargumented A item; wildcard in B (A's item is kept);
/// unargumented grant in B (B's item is kept); wildcard A item (every B item
/// of that name is kept).
pub fn intersect<T>(perms_a: &[T], perms_b: &[T]) -> HashSet<T>
where
    T: NamedArgument + Clone + Eq + Hash,
{
    let index_b = permission_index(perms_b);
    let mut result = HashSet::new();

    for perm in perms_a {
        let Some(by_argument) = index_b.get(perm.name()) else {
            continue;
        };
        if by_argument.contains_key(perm.argument()) || perm.argument().is_empty() {
            result.insert(perm.clone());
            continue;
        }
        if by_argument.contains_key("*") {
            result.insert(perm.clone());
            continue;
        }
        if let Some(unargumented) = by_argument.get("") {
            result.insert((*unargumented).clone());
            continue;
        }
        if perm.argument() == "*" {
            result.extend(by_argument.values().map(|p| (*p).clone()));
        }
    }

    result
}
