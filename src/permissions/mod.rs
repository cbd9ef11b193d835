pub mod arguments;
pub mod auditors;
pub mod errors;
pub mod glob;
pub mod grantable;
pub mod intersection;
pub mod notify;
pub mod owners;
pub mod ports;
pub mod service;
pub mod types;
pub mod validation;

pub use errors::PermissionError;
pub use owners::{OwnerKey, OwnerMap};
pub use service::{PermissionService, UpdateOutcome};

/// Holders own every enabled permission under `*`.
pub const PERMISSION_ADMIN: &str = "grantry.admin.permissions";
/// Delegation marker; the argument is `<permission-glob>[/<argument-pattern>]`.
pub const PERMISSION_GRANT: &str = "grantry.permission.grant";
/// Holders qualify as auditors for audited permissions.
pub const PERMISSION_AUDITOR: &str = "grantry.permission.auditor";

/// Permissions the service relies on. They always exist and can't be disabled.
pub const SYSTEM_PERMISSIONS: &[(&str, &str)] = &[
    (
        PERMISSION_ADMIN,
        "Administer all permissions and approve any permission request",
    ),
    (
        PERMISSION_GRANT,
        "Approve requests for permissions matching the argument",
    ),
    (
        PERMISSION_AUDITOR,
        "Allowed to control groups holding audited permissions",
    ),
];

pub fn is_system_permission(name: &str) -> bool {
    SYSTEM_PERMISSIONS.iter().any(|(n, _)| *n == name)
}
