use miette::Diagnostic;
use thiserror::Error;

use crate::permissions::types::RequestStatus;

#[derive(Debug, Error, Diagnostic)]
pub enum PermissionError {
    #[error("No permission named `{0}`")]
    #[diagnostic(code(grantry::permissions::no_such_permission))]
    NoSuchPermission(String),

    #[error("No group with id {0}")]
    #[diagnostic(code(grantry::permissions::no_such_group))]
    NoSuchGroup(i32),

    #[error("No permission request with id {0}")]
    #[diagnostic(code(grantry::permissions::no_such_request))]
    NoSuchRequest(i32),

    #[error("Invalid permission name `{0}`")]
    #[diagnostic(
        code(grantry::permissions::invalid_name),
        help("Permission names are lowercase alphanumeric segments joined by `.`, `-` or `_`")
    )]
    InvalidPermissionName(String),

    #[error("Permission argument `{0}` does not match the argument grammar")]
    #[diagnostic(
        code(grantry::permissions::malformed_argument),
        help("Arguments are empty, `*`, or letters, digits and `_=+/.:-` with an optional trailing `*`")
    )]
    MalformedArgument(String),

    #[error("Permission `{0}` is disabled")]
    #[diagnostic(code(grantry::permissions::disabled))]
    PermissionDisabled(String),

    #[error("Cannot disable system permission `{0}`")]
    #[diagnostic(code(grantry::permissions::system_permission))]
    CannotDisableSystemPermission(String),

    #[error("A pending request for `{permission}` ({argument}) already exists for group `{group}`")]
    #[diagnostic(code(grantry::permissions::request_exists))]
    RequestAlreadyExists {
        group: String,
        permission: String,
        argument: String,
    },

    #[error("Group `{group}` already holds `{permission}` ({argument})")]
    #[diagnostic(code(grantry::permissions::request_granted))]
    RequestAlreadyGranted {
        group: String,
        permission: String,
        argument: String,
    },

    #[error("No owners are available to approve `{permission}` ({argument})")]
    #[diagnostic(
        code(grantry::permissions::no_owners),
        help("Grant the permission-grant delegation for this permission to a group, or ask a permission admin")
    )]
    NoOwnersAvailable { permission: String, argument: String },

    #[error("Group `{group}` is controlled by `{user}`, who is not an auditor")]
    #[diagnostic(
        code(grantry::permissions::auditor_invariant),
        help("Audited permissions require every owner and manager of the group to be an auditor")
    )]
    AuditorInvariantViolation { group: String, user: String },

    #[error("Cannot move a request from `{from}` to `{to}`")]
    #[diagnostic(code(grantry::permissions::invalid_transition))]
    InvalidStatusTransition {
        from: RequestStatus,
        to: RequestStatus,
    },

    #[error("Group {group_id} already holds permission {permission_id} with argument `{argument}`")]
    #[diagnostic(code(grantry::permissions::grant_conflict))]
    GrantConflict {
        group_id: i32,
        permission_id: i32,
        argument: String,
    },

    #[error("Service account `{account}` already holds permission {permission_id} with argument `{argument}`")]
    #[diagnostic(code(grantry::permissions::service_account_grant_conflict))]
    ServiceAccountGrantConflict {
        account: String,
        permission_id: i32,
        argument: String,
    },

    #[error("Stored value is invalid: {0}")]
    #[diagnostic(code(grantry::permissions::corrupt))]
    Corrupt(String),

    #[error("Database error: {0}")]
    #[diagnostic(code(grantry::permissions::db))]
    Db(#[from] sea_orm::DbErr),
}
