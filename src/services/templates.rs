//! Prompt template resolution.
//!
//! Templates resolve in priority order: explicit template id on the request,
//! then the tenant's default, then the global default, then the built-in
//! fallback. The winning text is snapshotted onto the job at creation time so
//! later template edits never change an existing job's behavior.

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppResult;

/// Fallback template compiled into the binary, used when no database
/// template matches.
pub const BUILT_IN_TEMPLATE: &str = r#"You are a conversation quality reviewer.

Evaluate the following exchange between a user and an assistant.

User query:
{user_query}

Assistant reply:
{model_reply}

Respond with strict JSON only, no prose and no markdown fences, using exactly
this shape:
{
  "quality_score": <number 0-10>,
  "relevance": <number 0-10>,
  "completeness": <number 0-10>,
  "clarity": <number 0-10>,
  "sentiment": "<positive|neutral|negative>",
  "summary": "<one-sentence assessment>",
  "issues": ["<problem found>", ...],
  "improvements": ["<concrete suggestion>", ...],
  "missing_data": ["<information the reply needed but lacked>", ...]
}"#;

/// Resolves template text for job creation.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Template text by id, or `None` if no such template exists.
    async fn resolve(&self, id: Uuid) -> AppResult<Option<String>>;

    /// Default template text for the tenant scope, falling back to the
    /// global default and finally the built-in template.
    async fn resolve_default(&self, tenant_id: Option<&str>) -> AppResult<String>;
}

/// Template store backed by the prompt_templates table.
pub struct DbTemplateStore {
    pool: DbPool,
}

impl DbTemplateStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateStore for DbTemplateStore {
    async fn resolve(&self, id: Uuid) -> AppResult<Option<String>> {
        let template = self.pool.get_template_by_id(id).await?;
        Ok(template.map(|t| t.body))
    }

    async fn resolve_default(&self, tenant_id: Option<&str>) -> AppResult<String> {
        if let Some(tenant) = tenant_id {
            if let Some(template) = self.pool.get_default_template(Some(tenant)).await? {
                return Ok(template.body);
            }
        }

        if let Some(template) = self.pool.get_default_template(None).await? {
            return Ok(template.body);
        }

        Ok(BUILT_IN_TEMPLATE.to_string())
    }
}
