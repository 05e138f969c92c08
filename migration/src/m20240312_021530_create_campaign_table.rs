use entity::campaign;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(campaign::Entity)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(campaign::Column::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(campaign::Column::Title)
                            .string()
                            .not_null()
                            .default("".to_owned()),
                    )
                    .col(
                        ColumnDef::new(campaign::Column::Location)
                            .string()
                            .not_null()
                            .default("".to_owned()),
                    )
                    .col(
                        ColumnDef::new(campaign::Column::Description)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(campaign::Column::Status)
                            .string_len(32)
                            .not_null()
                            .default("active".to_owned()),
                    )
                    .col(
                        ColumnDef::new(campaign::Column::Goal)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(campaign::Column::Payment).json().null())
                    .col(
                        ColumnDef::new(campaign::Column::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_campaigns_created_at")
                    .col(campaign::Column::CreatedAt)
                    .table(campaign::Entity)
                    .to_owned(),
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_campaigns_created_at")
                    .table(campaign::Entity)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(campaign::Entity).to_owned())
            .await
    }
}
