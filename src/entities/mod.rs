pub mod audit_log;
pub mod comment;
pub mod group;
pub mod group_member;
pub mod permission;
pub mod permission_map;
pub mod permission_request;
pub mod request_status_change;
pub mod service_account_permission_map;

pub use audit_log::Entity as AuditLog;
pub use comment::Entity as Comment;
pub use group::Entity as Group;
pub use group_member::Entity as GroupMember;
pub use permission::Entity as Permission;
pub use permission_map::Entity as PermissionMap;
pub use permission_request::Entity as PermissionRequest;
pub use request_status_change::Entity as RequestStatusChange;
pub use service_account_permission_map::Entity as ServiceAccountPermissionMap;
