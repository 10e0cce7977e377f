//! Migration: Create analysis_jobs table.
//!
//! One row per batch analysis pipeline run. Also installs the shared
//! updated_at trigger function used by every table in this schema.

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
                CREATE OR REPLACE FUNCTION update_updated_at_column()
                RETURNS TRIGGER AS $$
                BEGIN
                    NEW.updated_at = NOW();
                    RETURN NEW;
                END;
                $$ LANGUAGE plpgsql;

                CREATE TABLE analysis_jobs (
                    id UUID PRIMARY KEY,

                    -- Lifecycle state machine: pending -> running -> completed/failed,
                    -- or running -> cancelled
                    status VARCHAR(20) NOT NULL DEFAULT 'pending'
                        CHECK (status IN ('pending', 'running', 'completed', 'failed', 'cancelled')),

                    -- Sampling scope
                    target_date DATE NOT NULL,
                    tenant_id VARCHAR(100), -- NULL = all tenants active on target_date
                    sample_size INTEGER NOT NULL,

                    -- Template text snapshot taken at creation; later template
                    -- edits never affect this job
                    prompt_template TEXT NOT NULL,

                    -- Progress counters, checkpointed after every chunk
                    total_items INTEGER NOT NULL DEFAULT 0,
                    processed_items INTEGER NOT NULL DEFAULT 0,
                    failed_items INTEGER NOT NULL DEFAULT 0,
                    CHECK (processed_items + failed_items <= total_items),

                    -- Error message if status is 'failed'
                    error_message TEXT,

                    started_at TIMESTAMPTZ,
                    completed_at TIMESTAMPTZ,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE INDEX idx_analysis_jobs_status ON analysis_jobs(status);
                CREATE INDEX idx_analysis_jobs_target_date ON analysis_jobs(target_date);
                CREATE INDEX idx_analysis_jobs_tenant_id ON analysis_jobs(tenant_id)
                    WHERE tenant_id IS NOT NULL;

                CREATE TRIGGER update_analysis_jobs_updated_at
                    BEFORE UPDATE ON analysis_jobs
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
                DROP TRIGGER IF EXISTS update_analysis_jobs_updated_at ON analysis_jobs;
                DROP TABLE IF EXISTS analysis_jobs CASCADE;
                "#,
            )
            .await?;

        Ok(())
    }
}
