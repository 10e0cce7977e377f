//! Database queries for prompt templates.

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::entity::prompt_template::{self as template, Entity as PromptTemplate};
use crate::error::{AppError, AppResult};

use super::DbPool;

impl DbPool {
    /// Get a template by ID.
    pub async fn get_template_by_id(&self, id: Uuid) -> AppResult<Option<template::Model>> {
        let result = PromptTemplate::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get template: {}", e)))?;

        Ok(result)
    }

    /// The default template for a tenant scope (NULL tenant = global default).
    pub async fn get_default_template(
        &self,
        tenant_id: Option<&str>,
    ) -> AppResult<Option<template::Model>> {
        let mut select = PromptTemplate::find().filter(template::Column::IsDefault.eq(true));

        select = match tenant_id {
            Some(tenant) => select.filter(template::Column::TenantId.eq(tenant)),
            None => select.filter(template::Column::TenantId.is_null()),
        };

        let result = select
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get default template: {}", e)))?;

        Ok(result)
    }
}
