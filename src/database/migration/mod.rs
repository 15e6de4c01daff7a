pub use sea_orm_migration::prelude::*;

mod m20250614_101500_leagues_table;
mod m20250614_101900_agents_tables;
mod m20250614_102300_schedule_tables;
mod m20250614_102700_results_table;
mod m20250614_103100_standings_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250614_101500_leagues_table::Migration),
            Box::new(m20250614_101900_agents_tables::Migration),
            Box::new(m20250614_102300_schedule_tables::Migration),
            Box::new(m20250614_102700_results_table::Migration),
            Box::new(m20250614_103100_standings_tables::Migration),
        ]
    }
}
