use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(EnumIter, DeriveActiveEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "snake_case")]
pub enum Gateway {
    #[sea_orm(string_value = "momo")]
    Momo,
    #[sea_orm(string_value = "vietqr")]
    #[serde(rename = "vietqr")]
    VietQr,
    #[sea_orm(string_value = "custom_qr")]
    CustomQr,
}

/// donation attempts, the campaign funding ledger

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "donations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// sent to the gateway as orderId
    #[sea_orm(unique)]
    pub order_id: String,

    pub campaign_id: i32,

    /// anonymous donation if none
    pub payer_id: Option<String>,

    /// VND
    pub amount: i64,

    pub gateway_code: Gateway,

    /// momo transId, bank reference for reconciled transfers
    pub gateway_transaction_id: Option<String>,

    /// momo requestId of the latest attempt
    pub request_id: Option<String>,

    /// normalized status
    pub status: String,

    /// status as reported by the provider
    pub provider_status: String,

    #[sea_orm(column_type = "Text")]
    pub message: String,

    /// data create time
    pub created_at: i64,
    pub updated_at: i64,
    pub paid_at: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::campaign::Entity",
        from = "Column::CampaignId",
        to = "super::campaign::Column::Id"
    )]
    Campaign,
}

impl Related<super::campaign::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Campaign.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
