use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create permission_requests table
        manager
            .create_table(
                Table::create()
                    .table(PermissionRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PermissionRequests::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string(PermissionRequests::Requester))
                    .col(integer(PermissionRequests::GroupId))
                    .col(integer(PermissionRequests::PermissionId))
                    .col(string(PermissionRequests::Argument))
                    .col(string(PermissionRequests::Status))
                    .col(big_integer(PermissionRequests::RequestedAt))
                    .to_owned(),
            )
            .await?;

        // Duplicate-pending lookups filter on the full triple plus status
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_permission_requests_triple")
                    .table(PermissionRequests::Table)
                    .col(PermissionRequests::GroupId)
                    .col(PermissionRequests::PermissionId)
                    .col(PermissionRequests::Argument)
                    .col(PermissionRequests::Status)
                    .to_owned(),
            )
            .await?;

        // Create permission_request_status_changes table
        manager
            .create_table(
                Table::create()
                    .table(PermissionRequestStatusChanges::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PermissionRequestStatusChanges::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(integer(PermissionRequestStatusChanges::RequestId))
                    .col(string(PermissionRequestStatusChanges::Actor))
                    .col(string_null(PermissionRequestStatusChanges::FromStatus))
                    .col(string(PermissionRequestStatusChanges::ToStatus))
                    .col(big_integer(PermissionRequestStatusChanges::ChangeAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_status_changes_request")
                            .from(
                                PermissionRequestStatusChanges::Table,
                                PermissionRequestStatusChanges::RequestId,
                            )
                            .to(PermissionRequests::Table, PermissionRequests::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_status_changes_request")
                    .table(PermissionRequestStatusChanges::Table)
                    .col(PermissionRequestStatusChanges::RequestId)
                    .to_owned(),
            )
            .await?;

        // Create comments table
        manager
            .create_table(
                Table::create()
                    .table(Comments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Comments::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(integer(Comments::StatusChangeId))
                    .col(string(Comments::Actor))
                    .col(string(Comments::Comment))
                    .col(big_integer(Comments::CreatedOn))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_comments_status_change")
                            .from(Comments::Table, Comments::StatusChangeId)
                            .to(
                                PermissionRequestStatusChanges::Table,
                                PermissionRequestStatusChanges::Id,
                            )
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create audit_log table
        manager
            .create_table(
                Table::create()
                    .table(AuditLog::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuditLog::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string(AuditLog::Actor))
                    .col(string(AuditLog::Action))
                    .col(string(AuditLog::Description))
                    .col(integer_null(AuditLog::OnGroupId))
                    .col(integer_null(AuditLog::OnPermissionId))
                    .col(string_null(AuditLog::OnUser))
                    .col(big_integer(AuditLog::LogTime))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_audit_log_permission")
                    .table(AuditLog::Table)
                    .col(AuditLog::OnPermissionId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AuditLog::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Comments::Table).to_owned())
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(PermissionRequestStatusChanges::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(PermissionRequests::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PermissionRequests {
    Table,
    Id,
    Requester,
    GroupId,
    PermissionId,
    Argument,
    Status,
    RequestedAt,
}

#[derive(DeriveIden)]
enum PermissionRequestStatusChanges {
    Table,
    Id,
    RequestId,
    Actor,
    FromStatus,
    ToStatus,
    ChangeAt,
}

#[derive(DeriveIden)]
enum Comments {
    Table,
    Id,
    StatusChangeId,
    Actor,
    Comment,
    CreatedOn,
}

#[derive(DeriveIden)]
enum AuditLog {
    Table,
    Id,
    Actor,
    Action,
    Description,
    OnGroupId,
    OnPermissionId,
    OnUser,
    LogTime,
}
