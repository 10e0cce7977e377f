//! Migration: Create analysis_results table.
//!
//! One row per sampled conversation within a job.

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
                CREATE TABLE analysis_results (
                    id UUID PRIMARY KEY,
                    job_id UUID NOT NULL REFERENCES analysis_jobs(id) ON DELETE CASCADE,

                    -- Sample identity
                    original_timestamp TIMESTAMPTZ NOT NULL,
                    tenant_id VARCHAR(100) NOT NULL,
                    session_id VARCHAR(100),
                    user_query TEXT NOT NULL,
                    model_reply TEXT NOT NULL,

                    -- Audit trail of the collaborator call
                    analysis_prompt TEXT NOT NULL,
                    analysis_result TEXT NOT NULL DEFAULT '',
                    model_name VARCHAR(100),
                    latency_ms BIGINT NOT NULL DEFAULT 0,
                    input_tokens INTEGER NOT NULL DEFAULT 0,
                    output_tokens INTEGER NOT NULL DEFAULT 0,

                    -- Per-sample outcome; a failed sample never fails the job
                    status VARCHAR(20) NOT NULL
                        CHECK (status IN ('success', 'failed')),
                    error_message TEXT,

                    -- Structured fields extracted from analysis_result
                    -- (all NULL/empty when the raw output is malformed)
                    quality_score DOUBLE PRECISION,
                    relevance DOUBLE PRECISION,
                    completeness DOUBLE PRECISION,
                    clarity DOUBLE PRECISION,
                    avg_score DOUBLE PRECISION,
                    sentiment VARCHAR(50),
                    summary_text TEXT,
                    issues JSONB NOT NULL DEFAULT '[]'::jsonb,
                    improvements JSONB NOT NULL DEFAULT '[]'::jsonb,
                    missing_data JSONB,
                    issue_count INTEGER NOT NULL DEFAULT 0,

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE INDEX idx_analysis_results_job_id ON analysis_results(job_id);
                CREATE INDEX idx_analysis_results_tenant_id ON analysis_results(tenant_id);

                -- Backfill scan: rows whose parse fields are still empty
                CREATE INDEX idx_analysis_results_unparsed ON analysis_results(id)
                    WHERE quality_score IS NULL AND analysis_result <> '';
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS analysis_results CASCADE;")
            .await?;

        Ok(())
    }
}
