use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectOptions,
    ConnectionTrait, Database, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};

use crate::entities;
use crate::errors::GrantryError;
use crate::permissions::errors::PermissionError;
use crate::permissions::ports::*;
use crate::permissions::types::*;
use crate::settings::Database as DbCfg;

pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, GrantryError> {
    let mut options = ConnectOptions::new(cfg.url.clone());
    if let Some(max) = cfg.max_connections {
        options.max_connections(max);
    }
    let db = Database::connect(options).await?;
    Ok(db)
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

fn flag(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

// Row conversions

fn to_permission(m: entities::permission::Model) -> Permission {
    Permission {
        id: m.id,
        name: m.name,
        description: m.description,
        created_on: m.created_on,
        enabled: m.enabled != 0,
        audited: m.audited != 0,
    }
}

fn to_group(m: entities::group::Model) -> Group {
    Group {
        id: m.id,
        name: m.groupname,
        enabled: m.enabled != 0,
        email_address: m.email_address,
    }
}

fn to_member(m: entities::group_member::Model) -> PermResult<GroupMember> {
    let role = MemberRole::parse(&m.role)
        .ok_or_else(|| PermissionError::Corrupt(format!("unknown member role `{}`", m.role)))?;
    Ok(GroupMember {
        group_id: m.group_id,
        username: m.username,
        role,
    })
}

fn to_request(m: entities::permission_request::Model) -> PermResult<PermissionRequest> {
    Ok(PermissionRequest {
        id: m.id,
        requester: m.requester,
        group_id: m.group_id,
        permission_id: m.permission_id,
        argument: m.argument,
        status: RequestStatus::parse(&m.status)?,
        requested_at: m.requested_at,
    })
}

fn to_status_change(m: entities::request_status_change::Model) -> PermResult<StatusChange> {
    Ok(StatusChange {
        id: m.id,
        request_id: m.request_id,
        actor: m.actor,
        from_status: m.from_status.as_deref().map(RequestStatus::parse).transpose()?,
        to_status: RequestStatus::parse(&m.to_status)?,
        change_at: m.change_at,
    })
}

fn to_comment(m: entities::comment::Model) -> Comment {
    Comment {
        id: m.id,
        status_change_id: m.status_change_id,
        actor: m.actor,
        comment: m.comment,
        created_on: m.created_on,
    }
}

fn to_audit_record(m: entities::audit_log::Model) -> AuditRecord {
    AuditRecord {
        id: m.id,
        entry: AuditEntry {
            actor: m.actor,
            action: m.action,
            description: m.description,
            on_group_id: m.on_group_id,
            on_permission_id: m.on_permission_id,
            on_user: m.on_user,
        },
        log_time: m.log_time,
    }
}

// Writes shared by the store and the unit of work

async fn insert_grant<C: ConnectionTrait>(
    db: &C,
    group_id: GroupId,
    permission_id: PermissionId,
    argument: &str,
) -> Result<(), DbErr> {
    entities::permission_map::ActiveModel {
        id: NotSet,
        permission_id: Set(permission_id),
        group_id: Set(group_id),
        argument: Set(argument.to_string()),
        granted_on: Set(Utc::now().timestamp()),
    }
    .insert(db)
    .await?;
    Ok(())
}

async fn insert_audit<C: ConnectionTrait>(db: &C, entry: AuditEntry) -> Result<(), DbErr> {
    entities::audit_log::ActiveModel {
        id: NotSet,
        actor: Set(entry.actor),
        action: Set(entry.action),
        description: Set(entry.description),
        on_group_id: Set(entry.on_group_id),
        on_permission_id: Set(entry.on_permission_id),
        on_user: Set(entry.on_user),
        log_time: Set(Utc::now().timestamp()),
    }
    .insert(db)
    .await?;
    Ok(())
}

async fn grants_with_names<C: ConnectionTrait>(
    db: &C,
    rows: Vec<entities::permission_map::Model>,
    enabled_only: bool,
) -> Result<Vec<Grant>, DbErr> {
    use entities::permission::{Column, Entity};

    let ids: BTreeSet<i32> = rows.iter().map(|r| r.permission_id).collect();
    let mut query = Entity::find().filter(Column::Id.is_in(ids));
    if enabled_only {
        query = query.filter(Column::Enabled.eq(1));
    }
    let names: HashMap<i32, String> = query
        .all(db)
        .await?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            names.get(&row.permission_id).map(|name| Grant {
                group_id: row.group_id,
                permission: name.clone(),
                argument: row.argument,
                granted_on: row.granted_on,
            })
        })
        .collect())
}

/// SeaORM-backed implementation of every read port and the grant primitives.
#[derive(Debug, Clone)]
pub struct SqlStore {
    db: DatabaseConnection,
}

impl SqlStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Start a unit of work for one workflow operation. The transaction is
    /// opened by the first write, so reads through this store stay usable
    /// until then even on a single-connection pool.
    pub fn begin(&self) -> SqlUnitOfWork {
        SqlUnitOfWork {
            db: self.db.clone(),
            txn: None,
            outbox: Vec::new(),
        }
    }

    // Group administration. Membership itself is managed elsewhere; these
    // exist so a deployment can seed groups.

    pub async fn create_group(&self, name: &str, email_address: Option<&str>) -> PermResult<Group> {
        let model = entities::group::ActiveModel {
            id: NotSet,
            groupname: Set(name.to_string()),
            email_address: Set(email_address.map(|s| s.to_string())),
            enabled: Set(1),
        }
        .insert(&self.db)
        .await?;
        Ok(to_group(model))
    }

    pub async fn set_group_enabled(&self, group_id: GroupId, enabled: bool) -> PermResult<()> {
        let group = entities::group::Entity::find_by_id(group_id)
            .one(&self.db)
            .await?
            .ok_or(PermissionError::NoSuchGroup(group_id))?;
        let mut active: entities::group::ActiveModel = group.into();
        active.enabled = Set(flag(enabled));
        active.update(&self.db).await?;
        Ok(())
    }

    pub async fn add_group_member(
        &self,
        group_id: GroupId,
        username: &str,
        role: MemberRole,
    ) -> PermResult<()> {
        entities::group_member::ActiveModel {
            id: NotSet,
            group_id: Set(group_id),
            username: Set(username.to_string()),
            role: Set(role.as_str().to_string()),
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }

    pub async fn remove_group_member(&self, group_id: GroupId, username: &str) -> PermResult<()> {
        use entities::group_member::{Column, Entity};

        Entity::delete_many()
            .filter(Column::GroupId.eq(group_id))
            .filter(Column::Username.eq(username))
            .exec(&self.db)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PermissionCatalog for SqlStore {
    async fn list(&self, include_disabled: bool) -> PermResult<Vec<Permission>> {
        use entities::permission::{Column, Entity};

        let mut query = Entity::find();
        if !include_disabled {
            query = query.filter(Column::Enabled.eq(1));
        }
        let rows = query.order_by_asc(Column::Name).all(&self.db).await?;
        Ok(rows.into_iter().map(to_permission).collect())
    }

    async fn get_by_name(&self, name: &str) -> PermResult<Option<Permission>> {
        use entities::permission::{Column, Entity};

        let row = Entity::find()
            .filter(Column::Name.eq(name))
            .one(&self.db)
            .await?;
        Ok(row.map(to_permission))
    }

    async fn get_by_id(&self, id: PermissionId) -> PermResult<Option<Permission>> {
        let row = entities::permission::Entity::find_by_id(id)
            .one(&self.db)
            .await?;
        Ok(row.map(to_permission))
    }

    async fn create(&self, name: &str, description: &str) -> PermResult<Permission> {
        let model = entities::permission::ActiveModel {
            id: NotSet,
            name: Set(name.to_string()),
            description: Set(description.to_string()),
            created_on: Set(Utc::now().timestamp()),
            enabled: Set(1),
            audited: Set(0),
        }
        .insert(&self.db)
        .await?;
        Ok(to_permission(model))
    }

    async fn set_enabled(&self, id: PermissionId, enabled: bool) -> PermResult<()> {
        let row = entities::permission::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| PermissionError::NoSuchPermission(format!("#{id}")))?;
        let mut active: entities::permission::ActiveModel = row.into();
        active.enabled = Set(flag(enabled));
        active.update(&self.db).await?;
        Ok(())
    }

    async fn set_audited(&self, id: PermissionId, audited: bool) -> PermResult<()> {
        let row = entities::permission::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| PermissionError::NoSuchPermission(format!("#{id}")))?;
        let mut active: entities::permission::ActiveModel = row.into();
        active.audited = Set(flag(audited));
        active.update(&self.db).await?;
        Ok(())
    }
}

#[async_trait]
impl GrantStore for SqlStore {
    async fn add_grant(
        &self,
        group_id: GroupId,
        permission_id: PermissionId,
        argument: &str,
    ) -> PermResult<()> {
        match insert_grant(&self.db, group_id, permission_id, argument).await {
            Ok(()) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(PermissionError::GrantConflict {
                group_id,
                permission_id,
                argument: argument.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    async fn add_service_account_grant(
        &self,
        account: &str,
        permission_id: PermissionId,
        argument: &str,
    ) -> PermResult<()> {
        let result = entities::service_account_permission_map::ActiveModel {
            id: NotSet,
            permission_id: Set(permission_id),
            service_account: Set(account.to_string()),
            argument: Set(argument.to_string()),
            granted_on: Set(Utc::now().timestamp()),
        }
        .insert(&self.db)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                Err(PermissionError::ServiceAccountGrantConflict {
                    account: account.to_string(),
                    permission_id,
                    argument: argument.to_string(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn list_grants_by_group(&self, group_id: GroupId) -> PermResult<Vec<Grant>> {
        use entities::permission_map::{Column, Entity};

        let rows = Entity::find()
            .filter(Column::GroupId.eq(group_id))
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await?;
        Ok(grants_with_names(&self.db, rows, false).await?)
    }

    async fn list_all_grants(&self) -> PermResult<Vec<Grant>> {
        use entities::permission_map::{Column, Entity};

        let rows = Entity::find()
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await?;
        Ok(grants_with_names(&self.db, rows, false).await?)
    }

    async fn list_groups_granted(
        &self,
        permission: &Permission,
    ) -> PermResult<Vec<(Group, String, i64)>> {
        use entities::permission_map::{Column, Entity};

        let rows = Entity::find()
            .filter(Column::PermissionId.eq(permission.id))
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await?;
        let group_ids: BTreeSet<i32> = rows.iter().map(|r| r.group_id).collect();
        let groups: HashMap<i32, Group> = entities::group::Entity::find()
            .filter(entities::group::Column::Id.is_in(group_ids))
            .filter(entities::group::Column::Enabled.eq(1))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|g| (g.id, to_group(g)))
            .collect();

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                groups
                    .get(&row.group_id)
                    .map(|g| (g.clone(), row.argument, row.granted_on))
            })
            .collect())
    }
}

#[async_trait]
impl GroupDirectory for SqlStore {
    async fn list_enabled_groups(&self) -> PermResult<Vec<Group>> {
        use entities::group::{Column, Entity};

        let rows = Entity::find()
            .filter(Column::Enabled.eq(1))
            .order_by_asc(Column::Groupname)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(to_group).collect())
    }

    async fn get_group(&self, id: GroupId) -> PermResult<Option<Group>> {
        let row = entities::group::Entity::find_by_id(id).one(&self.db).await?;
        Ok(row.map(to_group))
    }

    async fn direct_members(&self, group_id: GroupId) -> PermResult<Vec<GroupMember>> {
        use entities::group_member::{Column, Entity};

        Entity::find()
            .filter(Column::GroupId.eq(group_id))
            .order_by_asc(Column::Username)
            .all(&self.db)
            .await?
            .into_iter()
            .map(to_member)
            .collect()
    }

    async fn groups_for_user(&self, username: &str) -> PermResult<Vec<Group>> {
        use entities::group_member::{Column, Entity};

        let group_ids: Vec<i32> = Entity::find()
            .select_only()
            .column(Column::GroupId)
            .filter(Column::Username.eq(username))
            .into_tuple()
            .all(&self.db)
            .await?;
        let rows = entities::group::Entity::find()
            .filter(entities::group::Column::Id.is_in(group_ids))
            .order_by_asc(entities::group::Column::Groupname)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(to_group).collect())
    }

    async fn effective_permissions(&self, group_id: GroupId) -> PermResult<Vec<GrantedPermission>> {
        use entities::permission_map::{Column, Entity};

        let rows = Entity::find()
            .filter(Column::GroupId.eq(group_id))
            .all(&self.db)
            .await?;
        let grants = grants_with_names(&self.db, rows, true).await?;
        Ok(grants
            .into_iter()
            .map(|g| GrantedPermission::new(g.permission, g.argument))
            .collect())
    }
}

#[async_trait]
impl RequestStore for SqlStore {
    async fn get(&self, id: RequestId) -> PermResult<Option<PermissionRequest>> {
        entities::permission_request::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(to_request)
            .transpose()
    }

    async fn list(
        &self,
        status: Option<RequestStatus>,
        requester: Option<&str>,
    ) -> PermResult<Vec<PermissionRequest>> {
        use entities::permission_request::{Column, Entity};

        let mut query = Entity::find();
        if let Some(status) = status {
            query = query.filter(Column::Status.eq(status.as_str()));
        }
        if let Some(requester) = requester {
            query = query.filter(Column::Requester.eq(requester));
        }
        query
            .order_by_desc(Column::RequestedAt)
            .order_by_desc(Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(to_request)
            .collect()
    }

    async fn count_pending(
        &self,
        group_id: GroupId,
        permission_id: PermissionId,
        argument: &str,
    ) -> PermResult<u64> {
        use entities::permission_request::{Column, Entity};

        let count = Entity::find()
            .filter(Column::GroupId.eq(group_id))
            .filter(Column::PermissionId.eq(permission_id))
            .filter(Column::Argument.eq(argument))
            .filter(Column::Status.eq(RequestStatus::Pending.as_str()))
            .count(&self.db)
            .await?;
        Ok(count)
    }

    async fn pending_by_group(&self, group_id: GroupId) -> PermResult<Vec<PermissionRequest>> {
        use entities::permission_request::{Column, Entity};

        Entity::find()
            .filter(Column::GroupId.eq(group_id))
            .filter(Column::Status.eq(RequestStatus::Pending.as_str()))
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(to_request)
            .collect()
    }

    async fn status_changes(&self, request_ids: &[RequestId]) -> PermResult<Vec<StatusChange>> {
        use entities::request_status_change::{Column, Entity};

        if request_ids.is_empty() {
            return Ok(Vec::new());
        }
        Entity::find()
            .filter(Column::RequestId.is_in(request_ids.iter().copied()))
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(to_status_change)
            .collect()
    }

    async fn comments(&self, status_change_ids: &[i32]) -> PermResult<Vec<Comment>> {
        use entities::comment::{Column, Entity};

        if status_change_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = Entity::find()
            .filter(Column::StatusChangeId.is_in(status_change_ids.iter().copied()))
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(to_comment).collect())
    }
}

#[async_trait]
impl AuditLog for SqlStore {
    async fn record(&self, entry: AuditEntry) -> PermResult<()> {
        insert_audit(&self.db, entry).await?;
        Ok(())
    }

    async fn entries_for_permission(
        &self,
        permission_id: PermissionId,
        limit: u64,
    ) -> PermResult<Vec<AuditRecord>> {
        use entities::audit_log::{Column, Entity};

        let rows = Entity::find()
            .filter(Column::OnPermissionId.eq(permission_id))
            .order_by_desc(Column::LogTime)
            .order_by_desc(Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(to_audit_record).collect())
    }
}

/// One database transaction plus the notifications it wants sent. The
/// transaction is opened by the first write.
///
/// Dropping it without [`commit`](Self::commit) rolls everything back and
/// discards the queued notifications.
pub struct SqlUnitOfWork {
    db: DatabaseConnection,
    txn: Option<DatabaseTransaction>,
    outbox: Vec<Notification>,
}

impl SqlUnitOfWork {
    pub fn queued_notifications(&self) -> &[Notification] {
        &self.outbox
    }

    async fn transaction(&mut self) -> PermResult<&DatabaseTransaction> {
        let txn = match self.txn.take() {
            Some(txn) => txn,
            None => self.db.begin().await?,
        };
        Ok(&*self.txn.insert(txn))
    }

    /// Commit, then dispatch queued notifications. A failed dispatch is
    /// logged; the committed writes stand.
    pub async fn commit(self, notifier: &dyn Notifier) -> PermResult<()> {
        if let Some(txn) = self.txn {
            txn.commit().await?;
        }
        for notification in &self.outbox {
            if let Err(err) = notifier.send(notification).await {
                tracing::error!(
                    error = %err,
                    template = %notification.template,
                    "Failed to dispatch notification"
                );
            }
        }
        Ok(())
    }

    pub async fn rollback(self) -> PermResult<()> {
        if let Some(txn) = self.txn {
            txn.rollback().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for SqlUnitOfWork {
    async fn insert_request(
        &mut self,
        request: NewPermissionRequest,
    ) -> PermResult<PermissionRequest> {
        let model = entities::permission_request::ActiveModel {
            id: NotSet,
            requester: Set(request.requester),
            group_id: Set(request.group_id),
            permission_id: Set(request.permission_id),
            argument: Set(request.argument),
            status: Set(RequestStatus::Pending.as_str().to_string()),
            requested_at: Set(request.requested_at),
        }
        .insert(self.transaction().await?)
        .await?;
        to_request(model)
    }

    async fn append_status_change(&mut self, change: NewStatusChange) -> PermResult<StatusChange> {
        let txn = self.transaction().await?;
        let model = entities::request_status_change::ActiveModel {
            id: NotSet,
            request_id: Set(change.request_id),
            actor: Set(change.actor.clone()),
            from_status: Set(change.from_status.map(|s| s.as_str().to_string())),
            to_status: Set(change.to_status.as_str().to_string()),
            change_at: Set(change.change_at),
        }
        .insert(txn)
        .await?;

        entities::comment::ActiveModel {
            id: NotSet,
            status_change_id: Set(model.id),
            actor: Set(change.actor),
            comment: Set(change.comment),
            created_on: Set(change.change_at),
        }
        .insert(txn)
        .await?;

        to_status_change(model)
    }

    async fn set_request_status(
        &mut self,
        id: RequestId,
        from: RequestStatus,
        to: RequestStatus,
    ) -> PermResult<()> {
        use entities::permission_request::{Column, Entity};

        let txn = self.transaction().await?;
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(to.as_str()))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(from.as_str()))
            .exec(txn)
            .await?;
        if result.rows_affected == 1 {
            return Ok(());
        }

        // Someone moved the request since it was read.
        let row = Entity::find_by_id(id)
            .one(txn)
            .await?
            .ok_or(PermissionError::NoSuchRequest(id))?;
        Err(PermissionError::InvalidStatusTransition {
            from: RequestStatus::parse(&row.status)?,
            to,
        })
    }

    async fn apply_grant(
        &mut self,
        group_id: GroupId,
        permission_id: PermissionId,
        argument: &str,
    ) -> PermResult<GrantOutcome> {
        let savepoint = self.transaction().await?.begin().await?;
        match insert_grant(&savepoint, group_id, permission_id, argument).await {
            Ok(()) => {
                savepoint.commit().await?;
                Ok(GrantOutcome::Granted)
            }
            Err(err) if is_unique_violation(&err) => {
                savepoint.rollback().await?;
                Ok(GrantOutcome::AlreadyGranted)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn record_audit(&mut self, entry: AuditEntry) -> PermResult<()> {
        insert_audit(self.transaction().await?, entry).await?;
        Ok(())
    }

    fn queue_notification(&mut self, notification: Notification) {
        self.outbox.push(notification);
    }
}
