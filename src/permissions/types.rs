use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::permissions::errors::PermissionError;

pub type PermissionId = i32;
pub type GroupId = i32;
pub type RequestId = i32;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
    pub description: String,
    pub created_on: i64,
    pub enabled: bool,
    pub audited: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub enabled: bool,
    pub email_address: Option<String>,
}

/// Role of a direct member inside a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemberRole {
    Member,
    Owner,
    NpOwner,
    Manager,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Member => "member",
            MemberRole::Owner => "owner",
            MemberRole::NpOwner => "np-owner",
            MemberRole::Manager => "manager",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "member" => Some(MemberRole::Member),
            "owner" => Some(MemberRole::Owner),
            "np-owner" => Some(MemberRole::NpOwner),
            "manager" => Some(MemberRole::Manager),
            _ => None,
        }
    }

    /// Controllers can approve membership changes and are subject to the
    /// auditor invariant.
    pub fn is_controller(&self) -> bool {
        !matches!(self, MemberRole::Member)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub group_id: GroupId,
    /// Usernames are email addresses.
    pub username: String,
    pub role: MemberRole,
}

/// A permission held by a group, as stored in the permission map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grant {
    pub group_id: GroupId,
    pub permission: String,
    pub argument: String,
    pub granted_on: i64,
}

/// A `(name, argument)` pair, the shape effective-permission comparisons work on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrantedPermission {
    pub name: String,
    pub argument: String,
}

impl GrantedPermission {
    pub fn new(name: impl Into<String>, argument: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            argument: argument.into(),
        }
    }
}

/// Result of applying a concrete grant that is allowed to already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    Granted,
    AlreadyGranted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Actioned,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Actioned => "actioned",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self, PermissionError> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "actioned" => Ok(RequestStatus::Actioned),
            "cancelled" => Ok(RequestStatus::Cancelled),
            other => Err(PermissionError::Corrupt(format!(
                "unknown request status `{other}`"
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }

    /// Whether `self -> to` is a legal transition. Same-state is handled by
    /// the caller as a no-op before this is consulted.
    pub fn can_transition_to(&self, to: RequestStatus) -> bool {
        matches!(
            (self, to),
            (RequestStatus::Pending, RequestStatus::Actioned)
                | (RequestStatus::Pending, RequestStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequest {
    pub id: RequestId,
    pub requester: String,
    pub group_id: GroupId,
    pub permission_id: PermissionId,
    pub argument: String,
    pub status: RequestStatus,
    pub requested_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewPermissionRequest {
    pub requester: String,
    pub group_id: GroupId,
    pub permission_id: PermissionId,
    pub argument: String,
    pub requested_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub id: i32,
    pub request_id: RequestId,
    pub actor: String,
    pub from_status: Option<RequestStatus>,
    pub to_status: RequestStatus,
    pub change_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewStatusChange {
    pub request_id: RequestId,
    pub actor: String,
    pub from_status: Option<RequestStatus>,
    pub to_status: RequestStatus,
    pub change_at: i64,
    /// Stored as the comment row attached to this change.
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i32,
    pub status_change_id: i32,
    pub actor: String,
    pub comment: String,
    pub created_on: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor: String,
    pub action: String,
    pub description: String,
    pub on_group_id: Option<GroupId>,
    pub on_permission_id: Option<PermissionId>,
    pub on_user: Option<String>,
}

impl AuditEntry {
    pub fn new(actor: &str, action: &str, description: impl Into<String>) -> Self {
        Self {
            actor: actor.to_string(),
            action: action.to_string(),
            description: description.into(),
            on_group_id: None,
            on_permission_id: None,
            on_user: None,
        }
    }

    pub fn on_group(mut self, group_id: GroupId) -> Self {
        self.on_group_id = Some(group_id);
        self
    }

    pub fn on_permission(mut self, permission_id: PermissionId) -> Self {
        self.on_permission_id = Some(permission_id);
        self
    }

    pub fn on_user(mut self, username: &str) -> Self {
        self.on_user = Some(username.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i32,
    #[serde(flatten)]
    pub entry: AuditEntry,
    pub log_time: i64,
}

/// An outbound message handed to the [`Notifier`](crate::permissions::ports::Notifier).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub recipients: BTreeSet<String>,
    pub subject: String,
    pub template: String,
    pub context: serde_json::Value,
}

/// Listing filters for permission requests.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub requester: Option<String>,
    /// Keep only requests this user may approve through a group they belong to.
    pub approver: Option<String>,
    pub offset: usize,
    pub limit: Option<usize>,
}

/// A page of requests together with their audit trail.
#[derive(Debug, Clone, Default)]
pub struct RequestPage {
    pub requests: Vec<PermissionRequest>,
    pub status_changes_by_request: BTreeMap<RequestId, Vec<StatusChange>>,
    pub comment_by_status_change: BTreeMap<i32, Comment>,
    /// Number of matching requests before paging.
    pub total: usize,
}
