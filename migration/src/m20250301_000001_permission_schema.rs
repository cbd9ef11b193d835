use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create permissions table
        manager
            .create_table(
                Table::create()
                    .table(Permissions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Permissions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Permissions::Name).string().not_null().unique_key())
                    .col(string(Permissions::Description))
                    .col(big_integer(Permissions::CreatedOn))
                    .col(
                        ColumnDef::new(Permissions::Enabled)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Permissions::Audited)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        // Create groups table
        manager
            .create_table(
                Table::create()
                    .table(Groups::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Groups::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Groups::Groupname).string().not_null().unique_key())
                    .col(string_null(Groups::EmailAddress))
                    .col(
                        ColumnDef::new(Groups::Enabled)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .to_owned(),
            )
            .await?;

        // Create group_members table (direct members only)
        manager
            .create_table(
                Table::create()
                    .table(GroupMembers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GroupMembers::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(integer(GroupMembers::GroupId))
                    .col(string(GroupMembers::Username))
                    .col(string(GroupMembers::Role))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_group_members_group")
                            .from(GroupMembers::Table, GroupMembers::GroupId)
                            .to(Groups::Table, Groups::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_group_members_group_user")
                    .table(GroupMembers::Table)
                    .col(GroupMembers::GroupId)
                    .col(GroupMembers::Username)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_group_members_username")
                    .table(GroupMembers::Table)
                    .col(GroupMembers::Username)
                    .to_owned(),
            )
            .await?;

        // Create permission_map table (group grants)
        manager
            .create_table(
                Table::create()
                    .table(PermissionMap::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PermissionMap::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(integer(PermissionMap::PermissionId))
                    .col(integer(PermissionMap::GroupId))
                    .col(string(PermissionMap::Argument))
                    .col(big_integer(PermissionMap::GrantedOn))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_permission_map_permission")
                            .from(PermissionMap::Table, PermissionMap::PermissionId)
                            .to(Permissions::Table, Permissions::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_permission_map_group")
                            .from(PermissionMap::Table, PermissionMap::GroupId)
                            .to(Groups::Table, Groups::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // One grant per (permission, group, argument)
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_permission_map_unique")
                    .table(PermissionMap::Table)
                    .col(PermissionMap::PermissionId)
                    .col(PermissionMap::GroupId)
                    .col(PermissionMap::Argument)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Create service_account_permission_map table
        manager
            .create_table(
                Table::create()
                    .table(ServiceAccountPermissionMap::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ServiceAccountPermissionMap::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(integer(ServiceAccountPermissionMap::PermissionId))
                    .col(string(ServiceAccountPermissionMap::ServiceAccount))
                    .col(string(ServiceAccountPermissionMap::Argument))
                    .col(big_integer(ServiceAccountPermissionMap::GrantedOn))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sa_permission_map_permission")
                            .from(
                                ServiceAccountPermissionMap::Table,
                                ServiceAccountPermissionMap::PermissionId,
                            )
                            .to(Permissions::Table, Permissions::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_sa_permission_map_unique")
                    .table(ServiceAccountPermissionMap::Table)
                    .col(ServiceAccountPermissionMap::PermissionId)
                    .col(ServiceAccountPermissionMap::ServiceAccount)
                    .col(ServiceAccountPermissionMap::Argument)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ServiceAccountPermissionMap::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PermissionMap::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(GroupMembers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Groups::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Permissions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Permissions {
    Table,
    Id,
    Name,
    Description,
    CreatedOn,
    Enabled,
    Audited,
}

#[derive(DeriveIden)]
enum Groups {
    Table,
    Id,
    Groupname,
    EmailAddress,
    Enabled,
}

#[derive(DeriveIden)]
enum GroupMembers {
    Table,
    Id,
    GroupId,
    Username,
    Role,
}

#[derive(DeriveIden)]
enum PermissionMap {
    Table,
    Id,
    PermissionId,
    GroupId,
    Argument,
    GrantedOn,
}

#[derive(DeriveIden)]
enum ServiceAccountPermissionMap {
    Table,
    Id,
    PermissionId,
    ServiceAccount,
    Argument,
    GrantedOn,
}
