use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "permission_requests")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub requester: String,
    pub group_id: i32,
    pub permission_id: i32,
    pub argument: String,
    pub status: String, // "pending" | "actioned" | "cancelled"
    pub requested_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
