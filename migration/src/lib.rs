pub use sea_orm_migration::prelude::*;

mod m20240312_021530_create_campaign_table;
mod m20240312_022144_create_donation_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240312_021530_create_campaign_table::Migration),
            Box::new(m20240312_022144_create_donation_table::Migration),
        ]
    }
}
