use std::sync::Arc;

use async_trait::async_trait;

use crate::permissions::errors::PermissionError;
use crate::permissions::intersection::intersect;
use crate::permissions::ports::{AuditorPolicy, GroupDirectory, PermResult};
use crate::permissions::types::{GrantedPermission, Group};
use crate::permissions::PERMISSION_AUDITOR;

/// Auditors are users in a group that holds the auditor permission.
/// Controllers are direct members with an owner, np-owner or manager role.
pub struct ControllerAuditorPolicy {
    groups: Arc<dyn GroupDirectory>,
}

impl ControllerAuditorPolicy {
    pub fn new(groups: Arc<dyn GroupDirectory>) -> Self {
        Self { groups }
    }

    pub async fn is_auditor(&self, username: &str) -> PermResult<bool> {
        let wanted = [GrantedPermission::new(PERMISSION_AUDITOR, "")];
        for group in self.groups.groups_for_user(username).await? {
            if !group.enabled {
                continue;
            }
            let held = self.groups.effective_permissions(group.id).await?;
            if !intersect(&wanted, &held).is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl AuditorPolicy for ControllerAuditorPolicy {
    async fn assert_controllers_are_auditors(&self, group: &Group) -> PermResult<()> {
        for member in self.groups.direct_members(group.id).await? {
            if !member.role.is_controller() {
                continue;
            }
            if !self.is_auditor(&member.username).await? {
                return Err(PermissionError::AuditorInvariantViolation {
                    group: group.name.clone(),
                    user: member.username,
                });
            }
        }
        Ok(())
    }
}
