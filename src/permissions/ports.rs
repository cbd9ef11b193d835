//! Collaborator seams the permission core calls into.
//!
//! Reads go through the long-lived catalog/store traits. Every mutation made
//! by the request workflow goes through a [`UnitOfWork`] supplied by the
//! caller, which commits it only after the whole operation succeeded.

use async_trait::async_trait;

use crate::permissions::errors::PermissionError;
use crate::permissions::owners::OwnerMap;
use crate::permissions::types::*;

pub type PermResult<T> = Result<T, PermissionError>;

#[async_trait]
pub trait PermissionCatalog: Send + Sync {
    /// All permissions ordered by name.
    async fn list(&self, include_disabled: bool) -> PermResult<Vec<Permission>>;
    async fn get_by_name(&self, name: &str) -> PermResult<Option<Permission>>;
    async fn get_by_id(&self, id: PermissionId) -> PermResult<Option<Permission>>;
    async fn create(&self, name: &str, description: &str) -> PermResult<Permission>;
    async fn set_enabled(&self, id: PermissionId, enabled: bool) -> PermResult<()>;
    async fn set_audited(&self, id: PermissionId, audited: bool) -> PermResult<()>;
}

#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Fails with [`PermissionError::GrantConflict`] when the triple exists.
    async fn add_grant(
        &self,
        group_id: GroupId,
        permission_id: PermissionId,
        argument: &str,
    ) -> PermResult<()>;
    /// Fails with [`PermissionError::ServiceAccountGrantConflict`] when the triple exists.
    async fn add_service_account_grant(
        &self,
        account: &str,
        permission_id: PermissionId,
        argument: &str,
    ) -> PermResult<()>;
    async fn list_grants_by_group(&self, group_id: GroupId) -> PermResult<Vec<Grant>>;
    /// Every group grant, any group, any permission.
    async fn list_all_grants(&self) -> PermResult<Vec<Grant>>;
    /// Enabled groups holding `permission`, with the granted argument.
    async fn list_groups_granted(
        &self,
        permission: &Permission,
    ) -> PermResult<Vec<(Group, String, i64)>>;
}

/// Read-only view of groups and their direct members.
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    async fn list_enabled_groups(&self) -> PermResult<Vec<Group>>;
    async fn get_group(&self, id: GroupId) -> PermResult<Option<Group>>;
    async fn direct_members(&self, group_id: GroupId) -> PermResult<Vec<GroupMember>>;
    /// Groups `username` is a direct member of.
    async fn groups_for_user(&self, username: &str) -> PermResult<Vec<Group>>;
    /// Permissions the group currently holds, enabled permissions only.
    async fn effective_permissions(&self, group_id: GroupId) -> PermResult<Vec<GrantedPermission>>;
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn get(&self, id: RequestId) -> PermResult<Option<PermissionRequest>>;
    /// Newest first.
    async fn list(
        &self,
        status: Option<RequestStatus>,
        requester: Option<&str>,
    ) -> PermResult<Vec<PermissionRequest>>;
    async fn count_pending(
        &self,
        group_id: GroupId,
        permission_id: PermissionId,
        argument: &str,
    ) -> PermResult<u64>;
    async fn pending_by_group(&self, group_id: GroupId) -> PermResult<Vec<PermissionRequest>>;
    /// Status changes in creation order.
    async fn status_changes(&self, request_ids: &[RequestId]) -> PermResult<Vec<StatusChange>>;
    async fn comments(&self, status_change_ids: &[i32]) -> PermResult<Vec<Comment>>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> PermResult<()>;
    async fn entries_for_permission(
        &self,
        permission_id: PermissionId,
        limit: u64,
    ) -> PermResult<Vec<AuditRecord>>;
}

/// Fails when any controller of the group is not a qualified auditor.
#[async_trait]
pub trait AuditorPolicy: Send + Sync {
    async fn assert_controllers_are_auditors(&self, group: &Group) -> PermResult<()>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> PermResult<()>;
}

/// What an owner plugin gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct PluginContext<'a> {
    pub permissions: &'a [Permission],
    pub groups: &'a [Group],
}

/// Additional owner source merged into every resolution.
#[async_trait]
pub trait OwnerPluginProvider: Send + Sync {
    async fn contributed_owners(&self, context: &PluginContext<'_>) -> PermResult<OwnerMap>;
}

/// Buffered writes of one workflow operation.
///
/// Nothing written here is visible until the host commits. Notifications are
/// queued and must only be dispatched after a successful commit.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn insert_request(&mut self, request: NewPermissionRequest)
        -> PermResult<PermissionRequest>;
    /// Appends the status change and its comment row.
    async fn append_status_change(&mut self, change: NewStatusChange) -> PermResult<StatusChange>;
    /// Moves the request from `from` to `to` only if it is still in `from`.
    /// A request that moved in the meantime yields
    /// [`PermissionError::InvalidStatusTransition`] from its stored status.
    async fn set_request_status(
        &mut self,
        id: RequestId,
        from: RequestStatus,
        to: RequestStatus,
    ) -> PermResult<()>;
    /// A grant that already exists is reported, not raised, and leaves the
    /// rest of the unit of work intact.
    async fn apply_grant(
        &mut self,
        group_id: GroupId,
        permission_id: PermissionId,
        argument: &str,
    ) -> PermResult<GrantOutcome>;
    async fn record_audit(&mut self, entry: AuditEntry) -> PermResult<()>;
    fn queue_notification(&mut self, notification: Notification);
}
