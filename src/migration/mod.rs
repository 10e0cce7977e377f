//! SeaORM database migrations.

pub use sea_orm_migration::prelude::*;

mod m20260301_000001_create_analysis_jobs;
mod m20260301_000002_create_analysis_results;
mod m20260301_000003_create_analysis_schedules;
mod m20260301_000004_create_prompt_templates;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_analysis_jobs::Migration),
            Box::new(m20260301_000002_create_analysis_results::Migration),
            Box::new(m20260301_000003_create_analysis_schedules::Migration),
            Box::new(m20260301_000004_create_prompt_templates::Migration),
        ]
    }
}
