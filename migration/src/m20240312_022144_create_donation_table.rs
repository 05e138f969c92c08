use entity::donation;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(donation::Entity)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(donation::Column::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(donation::Column::OrderId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(donation::Column::CampaignId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(donation::Column::PayerId).string().null())
                    .col(
                        ColumnDef::new(donation::Column::Amount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(donation::Column::GatewayCode)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(donation::Column::GatewayTransactionId)
                            .string_len(128)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(donation::Column::RequestId)
                            .string_len(128)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(donation::Column::Status)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(donation::Column::ProviderStatus)
                            .string_len(64)
                            .not_null()
                            .default("".to_owned()),
                    )
                    .col(
                        ColumnDef::new(donation::Column::Message)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(donation::Column::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(donation::Column::UpdatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(donation::Column::PaidAt).big_integer().null())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_donations_order_id")
                    .col(donation::Column::OrderId)
                    .table(donation::Entity)
                    .unique()
                    .to_owned(),
            )
            .await?;
        // one ledger row per external transaction, replayed notifications can't double count
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_donations_gateway_transaction")
                    .col(donation::Column::GatewayCode)
                    .col(donation::Column::GatewayTransactionId)
                    .table(donation::Entity)
                    .unique()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_donations_campaign_status")
                    .col(donation::Column::CampaignId)
                    .col(donation::Column::Status)
                    .table(donation::Entity)
                    .to_owned(),
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for name in [
            "idx_donations_campaign_status",
            "uq_donations_gateway_transaction",
            "uq_donations_order_id",
        ] {
            manager
                .drop_index(Index::drop().name(name).table(donation::Entity).to_owned())
                .await?;
        }
        manager
            .drop_table(Table::drop().table(donation::Entity).to_owned())
            .await
    }
}
