use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Campaign metadata. Owned by the cms, only read here.

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "campaigns")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub title: String,

    pub location: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    pub status: String,

    /// VND, 0 means no target
    pub goal: i64,

    /// payment method object, `{method, bank, account, name, memo, qr_url}`
    pub payment: Option<Json>,

    /// data create time
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::donation::Entity")]
    Donation,
}

impl Related<super::donation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Donation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
