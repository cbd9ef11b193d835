//! The permission request workflow and the catalog operations around it.
//!
//! Every call recomputes what it needs from the backends; nothing is cached
//! between calls. Workflow mutations are written to the caller's
//! [`UnitOfWork`] only after every check has passed.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::permissions::arguments::grantable_arguments;
use crate::permissions::auditors::ControllerAuditorPolicy;
use crate::permissions::errors::PermissionError;
use crate::permissions::notify::{
    pending_subject, recipient_addresses, select_notified_owners, update_subject,
    TEMPLATE_ACTIONED, TEMPLATE_CANCELLED, TEMPLATE_PENDING,
};
use crate::permissions::owners::{collect_plugin_owners, owners_for, resolve_owners, OwnerMap};
use crate::permissions::ports::*;
use crate::permissions::types::*;
use crate::permissions::validation::{validate_grant_argument, validate_permission_name};
use crate::permissions::{is_system_permission, SYSTEM_PERMISSIONS};

/// Backends the service reads from.
#[derive(Clone)]
pub struct Backends {
    pub catalog: Arc<dyn PermissionCatalog>,
    pub grants: Arc<dyn GrantStore>,
    pub groups: Arc<dyn GroupDirectory>,
    pub requests: Arc<dyn RequestStore>,
    pub auditors: Arc<dyn AuditorPolicy>,
    pub audit_log: Arc<dyn AuditLog>,
}

impl Backends {
    /// Use one store for everything, with the controller-based auditor policy.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: PermissionCatalog + GrantStore + GroupDirectory + RequestStore + AuditLog + 'static,
    {
        let groups: Arc<dyn GroupDirectory> = store.clone();
        Self {
            catalog: store.clone(),
            grants: store.clone(),
            auditors: Arc::new(ControllerAuditorPolicy::new(groups.clone())),
            groups,
            requests: store.clone(),
            audit_log: store,
        }
    }
}

/// What [`PermissionService::update_request`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The request already had the requested status.
    Unchanged,
    Updated {
        status_change: StatusChange,
        /// Set when the request was actioned.
        grant: Option<GrantOutcome>,
    },
}

pub struct PermissionService {
    backends: Backends,
    plugins: Vec<Arc<dyn OwnerPluginProvider>>,
    restricted_ownership_permissions: Vec<String>,
    base_url: String,
}

impl PermissionService {
    pub fn new(backends: Backends) -> Self {
        Self {
            backends,
            plugins: Vec::new(),
            restricted_ownership_permissions: Vec::new(),
            base_url: String::new(),
        }
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn OwnerPluginProvider>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn with_restricted_ownership_permissions(mut self, permissions: Vec<String>) -> Self {
        self.restricted_ownership_permissions = permissions;
        self
    }

    /// Base of the links put into notification contexts.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    // ---------------------------------------------------------------------
    // Ownership resolution
    // ---------------------------------------------------------------------

    pub async fn owners_by_grantable_permission(
        &self,
        separate_global: bool,
    ) -> PermResult<OwnerMap> {
        let groups = self.backends.groups.list_enabled_groups().await?;
        let permissions = self.backends.catalog.list(false).await?;
        let grants = self.backends.grants.list_all_grants().await?;

        let context = PluginContext {
            permissions: &permissions,
            groups: &groups,
        };
        let contributions = collect_plugin_owners(&self.plugins, &context).await?;

        Ok(resolve_owners(
            &groups,
            &permissions,
            &grants,
            contributions,
            separate_global,
        ))
    }

    /// Grantable arguments per permission name, in their least permissive form.
    pub async fn grantable_permissions(&self) -> PermResult<BTreeMap<String, Vec<String>>> {
        let owners = self.owners_by_grantable_permission(false).await?;
        Ok(grantable_arguments(
            &owners,
            &self.restricted_ownership_permissions,
        ))
    }

    // ---------------------------------------------------------------------
    // Catalog administration
    // ---------------------------------------------------------------------

    pub async fn create_permission(&self, name: &str, description: &str) -> PermResult<Permission> {
        validate_permission_name(name)?;
        let permission = self.backends.catalog.create(name, description).await?;
        tracing::info!(permission = %permission.name, id = permission.id, "Created permission");
        Ok(permission)
    }

    pub async fn get_permission(&self, name: &str) -> PermResult<Option<Permission>> {
        self.backends.catalog.get_by_name(name).await
    }

    pub async fn get_all_permissions(&self, include_disabled: bool) -> PermResult<Vec<Permission>> {
        self.backends.catalog.list(include_disabled).await
    }

    /// Returns the permission and whether it was created by this call.
    pub async fn get_or_create_permission(
        &self,
        name: &str,
        description: &str,
    ) -> PermResult<(Permission, bool)> {
        match self.get_permission(name).await? {
            Some(permission) => Ok((permission, false)),
            None => Ok((self.create_permission(name, description).await?, true)),
        }
    }

    pub async fn bootstrap_system_permissions(&self) -> PermResult<Vec<Permission>> {
        let mut permissions = Vec::with_capacity(SYSTEM_PERMISSIONS.len());
        for (name, description) in SYSTEM_PERMISSIONS {
            let (permission, is_new) = self.get_or_create_permission(name, description).await?;
            if is_new {
                tracing::info!(permission = %name, "Bootstrapped system permission");
            }
            permissions.push(permission);
        }
        Ok(permissions)
    }

    async fn require_permission(&self, name: &str) -> PermResult<Permission> {
        self.get_permission(name)
            .await?
            .ok_or_else(|| PermissionError::NoSuchPermission(name.to_string()))
    }

    pub async fn disable_permission(&self, name: &str, actor: &str) -> PermResult<()> {
        if is_system_permission(name) {
            return Err(PermissionError::CannotDisableSystemPermission(
                name.to_string(),
            ));
        }
        let permission = self.require_permission(name).await?;
        self.backends.catalog.set_enabled(permission.id, false).await?;
        self.backends
            .audit_log
            .record(
                AuditEntry::new(actor, "disable_permission", "Disabled permission.")
                    .on_permission(permission.id),
            )
            .await?;
        tracing::info!(permission = %name, actor = %actor, "Disabled permission");
        Ok(())
    }

    pub async fn enable_permission_auditing(&self, name: &str, actor: &str) -> PermResult<()> {
        self.set_auditing(name, actor, true).await
    }

    pub async fn disable_permission_auditing(&self, name: &str, actor: &str) -> PermResult<()> {
        self.set_auditing(name, actor, false).await
    }

    async fn set_auditing(&self, name: &str, actor: &str, audited: bool) -> PermResult<()> {
        let permission = self.require_permission(name).await?;
        self.backends
            .catalog
            .set_audited(permission.id, audited)
            .await?;

        let (action, description) = if audited {
            ("enable_auditing", "Enabled auditing.")
        } else {
            ("disable_auditing", "Disabled auditing.")
        };
        self.backends
            .audit_log
            .record(AuditEntry::new(actor, action, description).on_permission(permission.id))
            .await?;
        tracing::info!(permission = %name, audited, actor = %actor, "Changed permission auditing");
        Ok(())
    }

    /// Enabled groups holding the permission. Empty for a disabled permission.
    pub async fn groups_by_permission(
        &self,
        permission: &Permission,
    ) -> PermResult<Vec<(Group, String, i64)>> {
        if !permission.enabled {
            return Ok(Vec::new());
        }
        self.backends.grants.list_groups_granted(permission).await
    }

    pub async fn audit_entries_for_permission(
        &self,
        permission: &Permission,
        limit: u64,
    ) -> PermResult<Vec<AuditRecord>> {
        self.backends
            .audit_log
            .entries_for_permission(permission.id, limit)
            .await
    }

    // ---------------------------------------------------------------------
    // Grant primitives
    // ---------------------------------------------------------------------

    /// Fails with [`PermissionError::GrantConflict`] if the group already
    /// holds the exact grant.
    pub async fn grant_permission(
        &self,
        group_id: GroupId,
        permission_id: PermissionId,
        argument: &str,
    ) -> PermResult<()> {
        let permission = self
            .backends
            .catalog
            .get_by_id(permission_id)
            .await?
            .ok_or_else(|| PermissionError::NoSuchPermission(permission_id.to_string()))?;
        validate_grant_argument(&permission.name, argument)?;
        self.backends
            .grants
            .add_grant(group_id, permission_id, argument)
            .await
    }

    pub async fn grant_permission_to_service_account(
        &self,
        account: &str,
        permission: &Permission,
        argument: &str,
    ) -> PermResult<()> {
        validate_grant_argument(&permission.name, argument)?;
        self.backends
            .grants
            .add_service_account_grant(account, permission.id, argument)
            .await
    }

    // ---------------------------------------------------------------------
    // Request workflow
    // ---------------------------------------------------------------------

    /// Open a pending request and queue a notification to its approvers.
    pub async fn create_request(
        &self,
        uow: &mut dyn UnitOfWork,
        requester: &str,
        group: &Group,
        permission: &Permission,
        argument: &str,
        reason: &str,
    ) -> PermResult<PermissionRequest> {
        validate_grant_argument(&permission.name, argument)?;
        if !permission.enabled {
            return Err(PermissionError::PermissionDisabled(permission.name.clone()));
        }

        let held = self.backends.groups.effective_permissions(group.id).await?;
        if held
            .iter()
            .any(|p| p.name == permission.name && p.argument == argument)
        {
            return Err(PermissionError::RequestAlreadyGranted {
                group: group.name.clone(),
                permission: permission.name.clone(),
                argument: argument.to_string(),
            });
        }

        let pending = self
            .backends
            .requests
            .count_pending(group.id, permission.id, argument)
            .await?;
        if pending > 0 {
            return Err(PermissionError::RequestAlreadyExists {
                group: group.name.clone(),
                permission: permission.name.clone(),
                argument: argument.to_string(),
            });
        }

        let owners = self.owners_by_grantable_permission(true).await?;
        let owner_arg_list = owners_for(&owners, &permission.name, argument);
        if owner_arg_list.is_empty() {
            return Err(PermissionError::NoOwnersAvailable {
                permission: permission.name.clone(),
                argument: argument.to_string(),
            });
        }

        if permission.audited {
            self.backends
                .auditors
                .assert_controllers_are_auditors(group)
                .await?;
        }

        let notified = select_notified_owners(&owner_arg_list, owners.global_owners());
        let recipients = recipient_addresses(self.backends.groups.as_ref(), &notified).await?;

        let now = Utc::now().timestamp();
        let request = uow
            .insert_request(NewPermissionRequest {
                requester: requester.to_string(),
                group_id: group.id,
                permission_id: permission.id,
                argument: argument.to_string(),
                requested_at: now,
            })
            .await?;
        uow.append_status_change(NewStatusChange {
            request_id: request.id,
            actor: requester.to_string(),
            from_status: None,
            to_status: RequestStatus::Pending,
            change_at: now,
            comment: reason.to_string(),
        })
        .await?;

        uow.queue_notification(Notification {
            recipients,
            subject: pending_subject(&permission.name, &group.name),
            template: TEMPLATE_PENDING.to_string(),
            context: json!({
                "user_name": requester,
                "group_name": group.name,
                "permission_name": permission.name,
                "argument": argument,
                "reason": reason,
                "request_id": request.id,
                "request_url": format!("{}/permissions/requests/{}", self.base_url, request.id),
            }),
        });

        tracing::info!(
            request_id = request.id,
            requester = %requester,
            group = %group.name,
            permission = %permission.name,
            argument = %argument,
            "Created permission request"
        );
        Ok(request)
    }

    /// Move a pending request to `actioned` or `cancelled`.
    ///
    /// Actioning applies the grant. A grant that already exists does not
    /// fail the update.
    pub async fn update_request(
        &self,
        uow: &mut dyn UnitOfWork,
        request: &PermissionRequest,
        actor: &str,
        new_status: RequestStatus,
        comment: &str,
    ) -> PermResult<UpdateOutcome> {
        if request.status == new_status {
            return Ok(UpdateOutcome::Unchanged);
        }
        if !request.status.can_transition_to(new_status) {
            return Err(PermissionError::InvalidStatusTransition {
                from: request.status,
                to: new_status,
            });
        }

        let permission = self
            .backends
            .catalog
            .get_by_id(request.permission_id)
            .await?
            .ok_or_else(|| PermissionError::Corrupt(format!(
                "request {} references missing permission {}",
                request.id, request.permission_id
            )))?;
        let group = self
            .backends
            .groups
            .get_group(request.group_id)
            .await?
            .ok_or(PermissionError::NoSuchGroup(request.group_id))?;

        // Membership may have changed since the request was opened.
        if new_status == RequestStatus::Actioned && permission.audited {
            self.backends
                .auditors
                .assert_controllers_are_auditors(&group)
                .await?;
        }

        uow.set_request_status(request.id, request.status, new_status).await?;

        let now = Utc::now().timestamp();
        let status_change = uow
            .append_status_change(NewStatusChange {
                request_id: request.id,
                actor: actor.to_string(),
                from_status: Some(request.status),
                to_status: new_status,
                change_at: now,
                comment: comment.to_string(),
            })
            .await?;

        let grant = if new_status == RequestStatus::Actioned {
            let outcome = uow
                .apply_grant(group.id, permission.id, &request.argument)
                .await?;
            if outcome == GrantOutcome::AlreadyGranted {
                tracing::warn!(
                    request_id = request.id,
                    group = %group.name,
                    permission = %permission.name,
                    argument = %request.argument,
                    "Grant already existed while actioning request"
                );
            }
            Some(outcome)
        } else {
            None
        };

        uow.record_audit(
            AuditEntry::new(
                actor,
                "update_perm_request",
                format!("updated permission request to status: {new_status}"),
            )
            .on_group(group.id)
            .on_user(&request.requester)
            .on_permission(permission.id),
        )
        .await?;

        let template = match new_status {
            RequestStatus::Actioned => TEMPLATE_ACTIONED,
            _ => TEMPLATE_CANCELLED,
        };
        uow.queue_notification(Notification {
            recipients: [request.requester.clone()].into_iter().collect(),
            subject: update_subject(&permission.name, &group.name),
            template: template.to_string(),
            context: json!({
                "group_name": group.name,
                "action_taken_by": actor,
                "reason": comment,
                "permission_name": permission.name,
                "argument": request.argument,
            }),
        });

        tracing::info!(
            request_id = request.id,
            actor = %actor,
            from = %request.status,
            to = %new_status,
            "Updated permission request"
        );
        Ok(UpdateOutcome::Updated {
            status_change,
            grant,
        })
    }

    // ---------------------------------------------------------------------
    // Request queries
    // ---------------------------------------------------------------------

    /// Whether any of `approver_group_ids` owns the request's permission
    /// and argument.
    pub async fn can_approve_request(
        &self,
        request: &PermissionRequest,
        approver_group_ids: &HashSet<GroupId>,
        owners: &OwnerMap,
    ) -> PermResult<bool> {
        let permission = self
            .backends
            .catalog
            .get_by_id(request.permission_id)
            .await?
            .ok_or_else(|| PermissionError::Corrupt(format!(
                "request {} references missing permission {}",
                request.id, request.permission_id
            )))?;
        Ok(approvable_by(&permission.name, request, approver_group_ids, owners))
    }

    pub async fn get_requests(&self, filter: &RequestFilter) -> PermResult<RequestPage> {
        let mut requests = self
            .backends
            .requests
            .list(filter.status, filter.requester.as_deref())
            .await?;

        if let Some(approver) = &filter.approver {
            let group_ids: HashSet<GroupId> = self
                .backends
                .groups
                .groups_for_user(approver)
                .await?
                .into_iter()
                .map(|g| g.id)
                .collect();
            let owners = self.owners_by_grantable_permission(false).await?;
            let names: BTreeMap<PermissionId, String> = self
                .backends
                .catalog
                .list(true)
                .await?
                .into_iter()
                .map(|p| (p.id, p.name))
                .collect();

            requests.retain(|request| {
                names
                    .get(&request.permission_id)
                    .is_some_and(|name| approvable_by(name, request, &group_ids, &owners))
            });
        }

        let total = requests.len();
        let requests: Vec<PermissionRequest> = requests
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect();

        let mut page = RequestPage {
            total,
            ..RequestPage::default()
        };
        if requests.is_empty() {
            return Ok(page);
        }

        let request_ids: Vec<RequestId> = requests.iter().map(|r| r.id).collect();
        let changes = self.backends.requests.status_changes(&request_ids).await?;
        let change_ids: Vec<i32> = changes.iter().map(|c| c.id).collect();
        for comment in self.backends.requests.comments(&change_ids).await? {
            page.comment_by_status_change
                .insert(comment.status_change_id, comment);
        }
        for change in changes {
            page.status_changes_by_request
                .entry(change.request_id)
                .or_default()
                .push(change);
        }
        page.requests = requests;
        Ok(page)
    }

    pub async fn get_request_by_id(&self, id: RequestId) -> PermResult<PermissionRequest> {
        self.backends
            .requests
            .get(id)
            .await?
            .ok_or(PermissionError::NoSuchRequest(id))
    }

    /// The request's trail, each status change with its comment.
    pub async fn changes_by_request_id(
        &self,
        id: RequestId,
    ) -> PermResult<Vec<(StatusChange, Comment)>> {
        let changes = self.backends.requests.status_changes(&[id]).await?;
        let change_ids: Vec<i32> = changes.iter().map(|c| c.id).collect();
        let mut comments: BTreeMap<i32, Comment> = self
            .backends
            .requests
            .comments(&change_ids)
            .await?
            .into_iter()
            .map(|c| (c.status_change_id, c))
            .collect();

        changes
            .into_iter()
            .map(|change| {
                let comment = comments.remove(&change.id).ok_or_else(|| {
                    PermissionError::Corrupt(format!(
                        "status change {} has no comment",
                        change.id
                    ))
                })?;
                Ok((change, comment))
            })
            .collect()
    }

    pub async fn pending_requests_by_group(
        &self,
        group: &Group,
    ) -> PermResult<Vec<PermissionRequest>> {
        self.backends.requests.pending_by_group(group.id).await
    }
}

fn approvable_by(
    permission: &str,
    request: &PermissionRequest,
    group_ids: &HashSet<GroupId>,
    owners: &OwnerMap,
) -> bool {
    owners_for(owners, permission, &request.argument)
        .iter()
        .any(|(group, _)| group_ids.contains(&group.id))
}
