pub use sea_orm_migration::prelude::*;

mod iden;
mod m20250101_000001_create_people_tables;
mod m20250101_000002_create_giving_tables;
mod m20250101_000003_create_event_tables;
mod m20250101_000004_create_volunteer_tables;
mod m20250101_000005_create_communication_tables;
mod m20250101_000006_create_help_request_tables;
mod m20250101_000007_create_onboarding_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_people_tables::Migration),
            Box::new(m20250101_000002_create_giving_tables::Migration),
            Box::new(m20250101_000003_create_event_tables::Migration),
            Box::new(m20250101_000004_create_volunteer_tables::Migration),
            Box::new(m20250101_000005_create_communication_tables::Migration),
            Box::new(m20250101_000006_create_help_request_tables::Migration),
            Box::new(m20250101_000007_create_onboarding_tables::Migration),
        ]
    }
}
