//! Migration: Create analysis_schedules table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TABLE analysis_schedules (
                    id UUID PRIMARY KEY,
                    name VARCHAR(200) NOT NULL,
                    is_enabled BOOLEAN NOT NULL DEFAULT TRUE,

                    -- Local fire time, interpreted in time_zone
                    hour INTEGER NOT NULL CHECK (hour BETWEEN 0 AND 23),
                    minute INTEGER NOT NULL CHECK (minute BETWEEN 0 AND 59),

                    -- Weekday numbers, 0 = Sunday .. 6 = Saturday; empty array = every day
                    days_of_week JSONB NOT NULL DEFAULT '[]'::jsonb,
                    time_zone VARCHAR(64) NOT NULL DEFAULT 'UTC',

                    -- Job parameters handed to create_job when the trigger fires
                    target_tenant_id VARCHAR(100),
                    sample_size INTEGER NOT NULL,
                    prompt_template_id UUID,

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE INDEX idx_analysis_schedules_enabled ON analysis_schedules(is_enabled)
                    WHERE is_enabled = TRUE;

                CREATE TRIGGER update_analysis_schedules_updated_at
                    BEFORE UPDATE ON analysis_schedules
                    FOR EACH ROW
                    EXECUTE FUNCTION update_updated_at_column();
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                DROP TRIGGER IF EXISTS update_analysis_schedules_updated_at ON analysis_schedules;
                DROP TABLE IF EXISTS analysis_schedules CASCADE;
                "#,
            )
            .await?;

        Ok(())
    }
}
