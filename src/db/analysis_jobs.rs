//! Database queries for analysis jobs.

use chrono::{NaiveDate, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::entity::analysis_job::{self as job, ActiveModel, Entity as Job};
use crate::error::{AppError, AppResult};
use crate::models::{JobStatus, QueryJobsParams};

use super::DbPool;

impl DbPool {
    /// Insert a new job in pending state.
    pub async fn insert_job(
        &self,
        id: Uuid,
        target_date: NaiveDate,
        tenant_id: Option<String>,
        sample_size: i32,
        prompt_template: String,
    ) -> AppResult<job::Model> {
        let now = Utc::now();

        let model = ActiveModel {
            id: Set(id),
            status: Set(JobStatus::Pending.as_str().to_string()),
            target_date: Set(target_date),
            tenant_id: Set(tenant_id),
            sample_size: Set(sample_size),
            prompt_template: Set(prompt_template),
            total_items: Set(0),
            processed_items: Set(0),
            failed_items: Set(0),
            error_message: Set(None),
            started_at: Set(None),
            completed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let result = model
            .insert(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert job: {}", e)))?;

        Ok(result)
    }

    /// Get a job by ID.
    pub async fn get_job_by_id(&self, id: Uuid) -> AppResult<Option<job::Model>> {
        let result = Job::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get job: {}", e)))?;

        Ok(result)
    }

    /// Atomically claim a job for execution.
    ///
    /// Single conditional UPDATE: status becomes `running` only where the
    /// current status is not `running`, so two near-simultaneous callers can
    /// never both claim the job. Counters and error state are reset for the
    /// fresh execution.
    ///
    /// Returns `Conflict` when the job is already running and `NotFound` when
    /// the id is unknown.
    pub async fn claim_job_for_run(&self, id: Uuid) -> AppResult<()> {
        let result = Job::update_many()
            .col_expr(job::Column::Status, Expr::value(JobStatus::Running.as_str()))
            .col_expr(job::Column::StartedAt, Expr::value(Some(Utc::now())))
            .col_expr(
                job::Column::CompletedAt,
                Expr::value(Option::<chrono::DateTime<Utc>>::None),
            )
            .col_expr(
                job::Column::ErrorMessage,
                Expr::value(Option::<String>::None),
            )
            .col_expr(job::Column::TotalItems, Expr::value(0))
            .col_expr(job::Column::ProcessedItems, Expr::value(0))
            .col_expr(job::Column::FailedItems, Expr::value(0))
            .filter(job::Column::Id.eq(id))
            .filter(job::Column::Status.ne(JobStatus::Running.as_str()))
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to claim job: {}", e)))?;

        if result.rows_affected == 1 {
            return Ok(());
        }

        // Zero rows: either the id is unknown or the job is already running.
        match self.get_job_by_id(id).await? {
            Some(_) => Err(AppError::Conflict(format!("Job {} is already running", id))),
            None => Err(AppError::NotFound(format!("Job {}", id))),
        }
    }

    /// Fix the total item count once samples have been fetched.
    pub async fn set_job_total_items(&self, id: Uuid, total: i32) -> AppResult<()> {
        let job = self
            .get_job_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {}", id)))?;

        let mut active: ActiveModel = job.into();
        active.total_items = Set(total);
        active.updated_at = Set(Utc::now());

        active
            .update(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to set job total: {}", e)))?;

        Ok(())
    }

    /// Checkpoint progress counters after a chunk.
    pub async fn update_job_progress(
        &self,
        id: Uuid,
        processed_items: i32,
        failed_items: i32,
    ) -> AppResult<()> {
        let job = self
            .get_job_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {}", id)))?;

        let mut active: ActiveModel = job.into();
        active.processed_items = Set(processed_items);
        active.failed_items = Set(failed_items);
        active.updated_at = Set(Utc::now());

        active
            .update(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to update job progress: {}", e)))?;

        Ok(())
    }

    /// Move a running job to a terminal status.
    ///
    /// Conditional UPDATE on `status = 'running'`, mirroring the claim: a job
    /// cancelled during its final chunk keeps its cancelled status instead of
    /// being overwritten. Returns whether the transition happened.
    pub async fn finish_job(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
    ) -> AppResult<bool> {
        let result = Job::update_many()
            .col_expr(job::Column::Status, Expr::value(status.as_str()))
            .col_expr(job::Column::ErrorMessage, Expr::value(error_message))
            .col_expr(job::Column::CompletedAt, Expr::value(Some(Utc::now())))
            .filter(job::Column::Id.eq(id))
            .filter(job::Column::Status.eq(JobStatus::Running.as_str()))
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to finish job: {}", e)))?;

        if result.rows_affected == 1 {
            return Ok(true);
        }

        // Zero rows: the job is already terminal (cancelled underneath the
        // execution loop) or the id is unknown.
        match self.get_job_by_id(id).await? {
            Some(_) => Ok(false),
            None => Err(AppError::NotFound(format!("Job {}", id))),
        }
    }

    /// Cancel a running job.
    ///
    /// Conditional UPDATE on `status = 'running'`; the execution loop observes
    /// the new status between chunks.
    pub async fn cancel_running_job(&self, id: Uuid) -> AppResult<()> {
        let result = Job::update_many()
            .col_expr(
                job::Column::Status,
                Expr::value(JobStatus::Cancelled.as_str()),
            )
            .col_expr(job::Column::CompletedAt, Expr::value(Some(Utc::now())))
            .filter(job::Column::Id.eq(id))
            .filter(job::Column::Status.eq(JobStatus::Running.as_str()))
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to cancel job: {}", e)))?;

        if result.rows_affected == 1 {
            return Ok(());
        }

        match self.get_job_by_id(id).await? {
            Some(existing) => Err(AppError::Conflict(format!(
                "Job {} is not running (status: {})",
                id, existing.status
            ))),
            None => Err(AppError::NotFound(format!("Job {}", id))),
        }
    }

    /// Read back only the status column (cancellation check between chunks).
    pub async fn get_job_status(&self, id: Uuid) -> AppResult<Option<JobStatus>> {
        let result = self.get_job_by_id(id).await?;
        Ok(result.and_then(|m| JobStatus::parse(&m.status)))
    }

    /// Query jobs with filtering and pagination.
    pub async fn query_jobs(&self, query: &QueryJobsParams) -> AppResult<(Vec<job::Model>, u64)> {
        let mut select = Job::find();

        if let Some(status) = query.status {
            select = select.filter(job::Column::Status.eq(status.as_str()));
        }

        if let Some(ref tenant_id) = query.tenant_id {
            select = select.filter(job::Column::TenantId.eq(tenant_id));
        }

        if let Some(target_date) = query.target_date {
            select = select.filter(job::Column::TargetDate.eq(target_date));
        }

        if let Some(ref from_date) = query.from_date {
            select = select.filter(job::Column::CreatedAt.gte(*from_date));
        }

        if let Some(ref to_date) = query.to_date {
            select = select.filter(job::Column::CreatedAt.lte(*to_date));
        }

        // Count total before pagination
        let total = select
            .clone()
            .count(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to count jobs: {}", e)))?;

        let limit = query.limit.clamp(1, 100) as u64;
        let offset = query.offset.max(0) as u64;

        let jobs = select
            .order_by_desc(job::Column::CreatedAt)
            .offset(offset)
            .limit(limit)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to query jobs: {}", e)))?;

        Ok((jobs, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn running_job_row(id: Uuid) -> job::Model {
        let now = Utc::now();
        job::Model {
            id,
            status: "running".to_string(),
            target_date: NaiveDate::from_ymd_opt(2025, 1, 16).unwrap(),
            tenant_id: None,
            sample_size: 100,
            prompt_template: "{user_query} {model_reply}".to_string(),
            total_items: 0,
            processed_items: 0,
            failed_items: 0,
            error_message: None,
            started_at: Some(now),
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_claim_succeeds_when_row_updated() {
        let id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let pool = DbPool::from_connection(db);
        assert!(pool.claim_job_for_run(id).await.is_ok());
    }

    #[tokio::test]
    async fn test_claim_rejects_running_job_with_conflict() {
        let id = Uuid::new_v4();
        // The conditional UPDATE matches no rows; the follow-up read finds a
        // running job, so the caller gets Conflict and no second execution.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .append_query_results([vec![running_job_row(id)]])
            .into_connection();

        let pool = DbPool::from_connection(db);
        match pool.claim_job_for_run(id).await {
            Err(AppError::Conflict(_)) => {}
            other => panic!("Expected Conflict, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_claim_unknown_job_is_not_found() {
        let id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .append_query_results([Vec::<job::Model>::new()])
            .into_connection();

        let pool = DbPool::from_connection(db);
        match pool.claim_job_for_run(id).await {
            Err(AppError::NotFound(_)) => {}
            other => panic!("Expected NotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_finish_transitions_running_job() {
        let id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let pool = DbPool::from_connection(db);
        assert!(pool
            .finish_job(id, JobStatus::Completed, None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_finish_leaves_cancelled_job_untouched() {
        let id = Uuid::new_v4();
        let mut cancelled = running_job_row(id);
        cancelled.status = "cancelled".to_string();

        // A cancel that lands during the final chunk must survive the
        // completion write: the conditional UPDATE matches no rows.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .append_query_results([vec![cancelled]])
            .into_connection();

        let pool = DbPool::from_connection(db);
        assert!(!pool
            .finish_job(id, JobStatus::Completed, None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_finish_unknown_job_is_not_found() {
        let id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .append_query_results([Vec::<job::Model>::new()])
            .into_connection();

        let pool = DbPool::from_connection(db);
        match pool.finish_job(id, JobStatus::Failed, None).await {
            Err(AppError::NotFound(_)) => {}
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_requires_running_status() {
        let id = Uuid::new_v4();
        let mut completed = running_job_row(id);
        completed.status = "completed".to_string();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .append_query_results([vec![completed]])
            .into_connection();

        let pool = DbPool::from_connection(db);
        match pool.cancel_running_job(id).await {
            Err(AppError::Conflict(_)) => {}
            other => panic!("Expected Conflict, got {:?}", other.map(|_| ())),
        }
    }
}
