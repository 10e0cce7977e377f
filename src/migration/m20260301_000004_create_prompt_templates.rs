//! Migration: Create prompt_templates table.
//!
//! Backing store for the prompt template resolution chain
//! (explicit id > tenant default > global default > built-in fallback).

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
                CREATE TABLE prompt_templates (
                    id UUID PRIMARY KEY,
                    tenant_id VARCHAR(100), -- NULL = global template
                    name VARCHAR(200) NOT NULL,
                    body TEXT NOT NULL,
                    is_default BOOLEAN NOT NULL DEFAULT FALSE,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                -- At most one default template per tenant scope
                CREATE UNIQUE INDEX idx_prompt_templates_tenant_default
                    ON prompt_templates(tenant_id) WHERE is_default = TRUE;
                CREATE UNIQUE INDEX idx_prompt_templates_global_default
                    ON prompt_templates((1)) WHERE is_default = TRUE AND tenant_id IS NULL;

                CREATE TRIGGER update_prompt_templates_updated_at
                    BEFORE UPDATE ON prompt_templates
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
                DROP TRIGGER IF EXISTS update_prompt_templates_updated_at ON prompt_templates;
                DROP TABLE IF EXISTS prompt_templates CASCADE;
                "#,
            )
            .await?;

        Ok(())
    }
}
