//! Database queries for analysis results.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::entity::analysis_result::{self as result, ActiveModel, Entity as AnalysisResult};
use crate::error::{AppError, AppResult};
use crate::models::ParsedAnalysis;

use super::DbPool;

impl DbPool {
    /// Insert a fully populated result row.
    pub async fn insert_result(&self, model: result::Model) -> AppResult<result::Model> {
        let active = ActiveModel {
            id: Set(model.id),
            job_id: Set(model.job_id),
            original_timestamp: Set(model.original_timestamp),
            tenant_id: Set(model.tenant_id),
            session_id: Set(model.session_id),
            user_query: Set(model.user_query),
            model_reply: Set(model.model_reply),
            analysis_prompt: Set(model.analysis_prompt),
            analysis_result: Set(model.analysis_result),
            model_name: Set(model.model_name),
            latency_ms: Set(model.latency_ms),
            input_tokens: Set(model.input_tokens),
            output_tokens: Set(model.output_tokens),
            status: Set(model.status),
            error_message: Set(model.error_message),
            quality_score: Set(model.quality_score),
            relevance: Set(model.relevance),
            completeness: Set(model.completeness),
            clarity: Set(model.clarity),
            avg_score: Set(model.avg_score),
            sentiment: Set(model.sentiment),
            summary_text: Set(model.summary_text),
            issues: Set(model.issues),
            improvements: Set(model.improvements),
            missing_data: Set(model.missing_data),
            issue_count: Set(model.issue_count),
            created_at: Set(model.created_at),
        };

        let inserted = active
            .insert(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert result: {}", e)))?;

        Ok(inserted)
    }

    /// Paged result listing for one job, oldest first.
    pub async fn get_results_for_job(
        &self,
        job_id: Uuid,
        limit: i32,
        offset: i32,
    ) -> AppResult<(Vec<result::Model>, u64)> {
        let select = AnalysisResult::find().filter(result::Column::JobId.eq(job_id));

        let total = select
            .clone()
            .count(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to count results: {}", e)))?;

        let results = select
            .order_by_asc(result::Column::CreatedAt)
            .offset(offset.max(0) as u64)
            .limit(limit.clamp(1, 200) as u64)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to query results: {}", e)))?;

        Ok((results, total))
    }

    /// Rows eligible for the parse-field backfill: no extracted quality score
    /// but non-empty raw analysis text.
    pub async fn get_unparsed_results(&self) -> AppResult<Vec<result::Model>> {
        let results = AnalysisResult::find()
            .filter(result::Column::QualityScore.is_null())
            .filter(result::Column::AnalysisResult.ne(""))
            .order_by_asc(result::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to query unparsed results: {}", e)))?;

        Ok(results)
    }

    /// Overwrite the parsed fields of an existing row (backfill pass).
    pub async fn update_result_parsed_fields(
        &self,
        id: Uuid,
        parsed: &ParsedAnalysis,
    ) -> AppResult<()> {
        let row = AnalysisResult::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get result: {}", e)))?
            .ok_or_else(|| AppError::NotFound(format!("Result {}", id)))?;

        let mut active: ActiveModel = row.into();
        active.quality_score = Set(parsed.quality_score);
        active.relevance = Set(parsed.relevance);
        active.completeness = Set(parsed.completeness);
        active.clarity = Set(parsed.clarity);
        active.avg_score = Set(parsed.avg_score);
        active.sentiment = Set(parsed.sentiment.clone());
        active.summary_text = Set(parsed.summary_text.clone());
        active.issues = Set(ParsedAnalysis::list_to_json(&parsed.issues));
        active.improvements = Set(ParsedAnalysis::list_to_json(&parsed.improvements));
        active.missing_data = Set(parsed
            .missing_data
            .as_deref()
            .map(ParsedAnalysis::list_to_json));
        active.issue_count = Set(parsed.issue_count);

        active
            .update(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to update parsed fields: {}", e)))?;

        Ok(())
    }

    /// Batch per-job mean avg_score over scored successful results.
    /// Returns a map of job_id -> mean, jobs without scored results omitted.
    pub async fn avg_scores_for_jobs(
        &self,
        job_ids: &[Uuid],
    ) -> AppResult<std::collections::HashMap<Uuid, f64>> {
        use sea_orm::{FromQueryResult, Statement};

        if job_ids.is_empty() {
            return Ok(std::collections::HashMap::new());
        }

        #[derive(Debug, FromQueryResult)]
        struct ScoreRow {
            job_id: Uuid,
            mean_score: f64,
        }

        let placeholders: Vec<String> = (1..=job_ids.len()).map(|i| format!("${}", i)).collect();
        let in_clause = placeholders.join(", ");

        let sql = format!(
            "SELECT job_id, AVG(avg_score) as mean_score FROM analysis_results \
             WHERE job_id IN ({}) AND status = 'success' AND avg_score IS NOT NULL \
             GROUP BY job_id",
            in_clause
        );

        let values: Vec<sea_orm::Value> = job_ids
            .iter()
            .map(|id| sea_orm::Value::Uuid(Some(*id)))
            .collect();

        let rows: Vec<ScoreRow> = ScoreRow::find_by_statement(Statement::from_sql_and_values(
            sea_orm::DatabaseBackend::Postgres,
            &sql,
            values,
        ))
        .all(self.connection())
        .await
        .map_err(|e| AppError::Database(format!("Failed to batch average scores: {}", e)))?;

        let mut scores = std::collections::HashMap::new();
        for row in rows {
            scores.insert(row.job_id, row.mean_score);
        }

        Ok(scores)
    }
}
