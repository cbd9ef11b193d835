// Integration tests for owner resolution and catalog administration
// against a migrated SQLite database.

mod helpers;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use grantry::permissions::ports::{
    GroupDirectory, OwnerPluginProvider, PermResult, PluginContext,
};
use grantry::permissions::types::MemberRole;
use grantry::permissions::service::Backends;
use grantry::permissions::{
    OwnerMap, PermissionError, PermissionService, PERMISSION_ADMIN, PERMISSION_AUDITOR,
    PERMISSION_GRANT,
};
use helpers::{seed_permission, test_service, GroupBuilder, TestDb};

fn owner_names(owners: &OwnerMap, permission: &str, argument: &str) -> Vec<String> {
    owners
        .owners_by_argument(permission)
        .and_then(|by_arg| by_arg.get(argument))
        .map(|groups| groups.iter().map(|g| g.name.clone()).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_admin_group_owns_every_enabled_permission() {
    let test_db = TestDb::new().await;
    let store = test_db.store();
    let service = test_service(&store).await;

    seed_permission(&service, "ssh").await;
    seed_permission(&service, "sudo").await;
    GroupBuilder::new("admins")
        .grant(PERMISSION_ADMIN, "")
        .create(&store, &service)
        .await;

    let owners = service
        .owners_by_grantable_permission(true)
        .await
        .expect("Failed to resolve owners");

    for name in ["ssh", "sudo", PERMISSION_ADMIN, PERMISSION_GRANT, PERMISSION_AUDITOR] {
        assert_eq!(owner_names(&owners, name, "*"), vec!["admins"], "{name}");
    }
    assert_eq!(owners.global_owners().len(), 1);
    assert_eq!(owners.global_owners()[0].name, "admins");

    service
        .disable_permission("sudo", "root@example.com")
        .await
        .expect("Failed to disable permission");

    let owners = service
        .owners_by_grantable_permission(true)
        .await
        .expect("Failed to resolve owners");
    assert!(!owners.contains_permission("sudo"));
    assert!(owners.contains_permission("ssh"));
}

#[tokio::test]
async fn test_delegations_expand_against_catalog() {
    let test_db = TestDb::new().await;
    let store = test_db.store();
    let service = test_service(&store).await;

    seed_permission(&service, "network-east").await;
    seed_permission(&service, "network-west").await;
    seed_permission(&service, "storage").await;
    GroupBuilder::new("net-owners")
        .grant(PERMISSION_GRANT, "network-*/prod")
        .create(&store, &service)
        .await;

    let grantable = service
        .grantable_permissions()
        .await
        .expect("Failed to compute grantable permissions");

    let expected: BTreeMap<String, Vec<String>> = [
        ("network-east".to_string(), vec!["prod".to_string()]),
        ("network-west".to_string(), vec!["prod".to_string()]),
    ]
    .into_iter()
    .collect();
    assert_eq!(grantable, expected);
}

#[tokio::test]
async fn test_disabled_group_owns_nothing() {
    let test_db = TestDb::new().await;
    let store = test_db.store();
    let service = test_service(&store).await;

    seed_permission(&service, "ssh").await;
    GroupBuilder::new("old-admins")
        .grant(PERMISSION_ADMIN, "")
        .disabled()
        .create(&store, &service)
        .await;

    let owners = service
        .owners_by_grantable_permission(true)
        .await
        .expect("Failed to resolve owners");
    assert!(owners.is_empty());
}

#[tokio::test]
async fn test_restricted_permissions_hide_wildcard_owners() {
    let test_db = TestDb::new().await;
    let store = test_db.store();
    let service = PermissionService::new(Backends::from_store(store.clone()))
        .with_restricted_ownership_permissions(vec!["ssh".to_string()]);

    seed_permission(&service, "ssh").await;
    seed_permission(&service, "sudo").await;
    service
        .bootstrap_system_permissions()
        .await
        .expect("Failed to bootstrap");
    GroupBuilder::new("admins")
        .grant(PERMISSION_ADMIN, "")
        .create(&store, &service)
        .await;
    GroupBuilder::new("east")
        .grant(PERMISSION_GRANT, "ssh/east")
        .grant(PERMISSION_GRANT, "sudo/east")
        .create(&store, &service)
        .await;

    let grantable = service
        .grantable_permissions()
        .await
        .expect("Failed to compute grantable permissions");

    assert_eq!(grantable["ssh"], vec!["east"]);
    assert_eq!(grantable["sudo"], vec!["*"]);
}

struct StaticOwners(OwnerMap);

#[async_trait]
impl OwnerPluginProvider for StaticOwners {
    async fn contributed_owners(&self, _context: &PluginContext<'_>) -> PermResult<OwnerMap> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn test_plugin_owners_are_merged() {
    let test_db = TestDb::new().await;
    let store = test_db.store();
    let base = test_service(&store).await;

    seed_permission(&base, "ssh").await;
    let oncall = GroupBuilder::new("oncall").create(&store, &base).await;
    GroupBuilder::new("ssh-owners")
        .grant(PERMISSION_GRANT, "ssh/prod")
        .create(&store, &base)
        .await;

    let mut contributed = OwnerMap::new();
    contributed.add_permission_owner("ssh", "prod", oncall.clone());
    contributed.add_permission_owner("ssh", "dev", oncall);

    let service = PermissionService::new(Backends::from_store(store.clone()))
        .with_plugin(Arc::new(StaticOwners(contributed)));
    let owners = service
        .owners_by_grantable_permission(false)
        .await
        .expect("Failed to resolve owners");

    assert_eq!(owner_names(&owners, "ssh", "prod"), vec!["ssh-owners", "oncall"]);
    assert_eq!(owner_names(&owners, "ssh", "dev"), vec!["oncall"]);
}

#[tokio::test]
async fn test_groups_by_permission() {
    let test_db = TestDb::new().await;
    let store = test_db.store();
    let service = test_service(&store).await;

    let ssh = seed_permission(&service, "ssh").await;
    let team = GroupBuilder::new("team")
        .with_email("team@example.com")
        .owner("carol@example.com")
        .member("dave@example.com")
        .grant("ssh", "prod")
        .create(&store, &service)
        .await;
    GroupBuilder::new("retired")
        .grant("ssh", "prod")
        .disabled()
        .create(&store, &service)
        .await;

    let holders = service
        .groups_by_permission(&ssh)
        .await
        .expect("Failed to list holders");
    assert_eq!(holders.len(), 1);
    assert_eq!(holders[0].0.name, "team");
    assert_eq!(holders[0].0.email_address.as_deref(), Some("team@example.com"));
    assert_eq!(holders[0].1, "prod");

    let mut members: Vec<(String, MemberRole)> = store
        .direct_members(team.id)
        .await
        .expect("Failed to load members")
        .into_iter()
        .map(|m| (m.username, m.role))
        .collect();
    members.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        members,
        vec![
            ("carol@example.com".to_string(), MemberRole::Owner),
            ("dave@example.com".to_string(), MemberRole::Member),
        ]
    );

    service
        .disable_permission("ssh", "root@example.com")
        .await
        .expect("Failed to disable permission");
    let ssh = service
        .get_permission("ssh")
        .await
        .expect("Failed to load permission")
        .expect("Permission not found");
    assert!(service
        .groups_by_permission(&ssh)
        .await
        .expect("Failed to list holders")
        .is_empty());
}

#[tokio::test]
async fn test_catalog_administration() {
    let test_db = TestDb::new().await;
    let store = test_db.store();
    let service = test_service(&store).await;

    let err = service
        .create_permission("Not Valid", "")
        .await
        .expect_err("Invalid name should be rejected");
    assert!(matches!(err, PermissionError::InvalidPermissionName(_)));

    let (ssh, is_new) = service
        .get_or_create_permission("ssh", "Shell access")
        .await
        .expect("Failed to create permission");
    assert!(is_new);
    let (again, is_new) = service
        .get_or_create_permission("ssh", "ignored")
        .await
        .expect("Failed to load permission");
    assert!(!is_new);
    assert_eq!(again.id, ssh.id);
    assert_eq!(again.description, "Shell access");

    let err = service
        .disable_permission(PERMISSION_ADMIN, "root@example.com")
        .await
        .expect_err("System permissions cannot be disabled");
    assert!(matches!(err, PermissionError::CannotDisableSystemPermission(_)));

    let err = service
        .disable_permission("missing", "root@example.com")
        .await
        .expect_err("Unknown permission");
    assert!(matches!(err, PermissionError::NoSuchPermission(_)));

    let err = service
        .enable_permission_auditing("missing", "root@example.com")
        .await
        .expect_err("Unknown permission");
    assert!(matches!(err, PermissionError::NoSuchPermission(_)));

    service
        .enable_permission_auditing("ssh", "root@example.com")
        .await
        .expect("Failed to enable auditing");
    let audited = service
        .get_permission("ssh")
        .await
        .expect("Failed to load permission")
        .expect("Permission not found");
    assert!(audited.audited);

    service
        .disable_permission_auditing("ssh", "root@example.com")
        .await
        .expect("Failed to disable auditing");
    service
        .disable_permission("ssh", "root@example.com")
        .await
        .expect("Failed to disable permission");

    let entries = service
        .audit_entries_for_permission(&ssh, 20)
        .await
        .expect("Failed to load audit entries");
    let actions: Vec<&str> = entries.iter().map(|e| e.entry.action.as_str()).collect();
    assert_eq!(
        actions,
        vec!["disable_permission", "disable_auditing", "enable_auditing"]
    );

    let enabled = service
        .get_all_permissions(false)
        .await
        .expect("Failed to list permissions");
    assert!(enabled.iter().all(|p| p.name != "ssh"));
    let all = service
        .get_all_permissions(true)
        .await
        .expect("Failed to list permissions");
    assert!(all.iter().any(|p| p.name == "ssh" && !p.enabled));
    let names: Vec<&str> = all.iter().map(|p| p.name.as_str()).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
}

#[tokio::test]
async fn test_grant_primitives() {
    let test_db = TestDb::new().await;
    let store = test_db.store();
    let service = test_service(&store).await;

    let ssh = seed_permission(&service, "ssh").await;
    let team = GroupBuilder::new("team").create(&store, &service).await;

    service
        .grant_permission(team.id, ssh.id, "prod")
        .await
        .expect("Failed to grant permission");
    let err = service
        .grant_permission(team.id, ssh.id, "prod")
        .await
        .expect_err("Duplicate grant should conflict");
    assert!(matches!(err, PermissionError::GrantConflict { .. }));

    let err = service
        .grant_permission(team.id, ssh.id, "two words")
        .await
        .expect_err("Malformed argument");
    assert!(matches!(err, PermissionError::MalformedArgument(_)));

    // Name globs belong to delegations, not to ordinary arguments.
    let err = service
        .grant_permission(team.id, ssh.id, "network-*/prod")
        .await
        .expect_err("Interior glob on an ordinary permission");
    assert!(matches!(err, PermissionError::MalformedArgument(_)));

    let grant = service
        .get_permission(PERMISSION_GRANT)
        .await
        .expect("Failed to load permission")
        .expect("Permission not found");
    service
        .grant_permission(team.id, grant.id, "network-*/prod")
        .await
        .expect("Failed to grant delegation");
    let err = service
        .grant_permission(team.id, grant.id, "Network/prod")
        .await
        .expect_err("Malformed delegation");
    assert!(matches!(err, PermissionError::MalformedArgument(_)));

    let err = service
        .grant_permission(team.id, 9999, "prod")
        .await
        .expect_err("Unknown permission");
    assert!(matches!(err, PermissionError::NoSuchPermission(_)));

    service
        .grant_permission_to_service_account("deploy@svc.example.com", &ssh, "prod")
        .await
        .expect("Failed to grant to service account");
    let err = service
        .grant_permission_to_service_account("deploy@svc.example.com", &ssh, "prod")
        .await
        .expect_err("Duplicate service account grant should conflict");
    assert!(matches!(err, PermissionError::ServiceAccountGrantConflict { .. }));
}
