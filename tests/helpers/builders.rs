use grantry::permissions::types::{Group, MemberRole};
use grantry::permissions::PermissionService;
use grantry::storage::SqlStore;

/// Builder for creating test groups with members and grants
pub struct GroupBuilder {
    name: String,
    email: Option<String>,
    members: Vec<(String, MemberRole)>,
    grants: Vec<(String, String)>,
    enabled: bool,
}

impl GroupBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            email: None,
            members: Vec::new(),
            grants: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn member(mut self, username: &str) -> Self {
        self.members.push((username.to_string(), MemberRole::Member));
        self
    }

    pub fn owner(mut self, username: &str) -> Self {
        self.members.push((username.to_string(), MemberRole::Owner));
        self
    }

    /// Grant an existing permission by name
    pub fn grant(mut self, permission: &str, argument: &str) -> Self {
        self.grants
            .push((permission.to_string(), argument.to_string()));
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub async fn create(self, store: &SqlStore, service: &PermissionService) -> Group {
        let mut group = store
            .create_group(&self.name, self.email.as_deref())
            .await
            .expect("Failed to create test group");

        for (username, role) in &self.members {
            store
                .add_group_member(group.id, username, *role)
                .await
                .expect("Failed to add group member");
        }

        for (permission, argument) in &self.grants {
            let permission = service
                .get_permission(permission)
                .await
                .expect("Failed to load permission")
                .expect("Permission not found");
            service
                .grant_permission(group.id, permission.id, argument)
                .await
                .expect("Failed to grant permission");
        }

        if !self.enabled {
            store
                .set_group_enabled(group.id, false)
                .await
                .expect("Failed to disable group");
            group.enabled = false;
        }

        group
    }
}
