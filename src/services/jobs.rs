//! Job lifecycle orchestration.
//!
//! Jobs are created in pending state with a template snapshot, claimed
//! atomically for execution, then processed chunk by chunk in a detached task.
//! Cancellation is cooperative: the loop re-reads the job status between
//! chunks and stops before the next chunk starts, keeping all rows written so
//! far.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{error, info};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entity::analysis_result;
use crate::error::{AppError, AppResult};
use crate::models::{
    ConversationSample, CreateJobRequest, JobStatus, MigrateParseFieldsResponse, ParsedAnalysis,
    ResultStatus, RunJobResponse,
};
use crate::services::alerts::{should_alert_low_quality, AlertDispatcher};
use crate::services::analyzer::{BatchAnalyzer, SampleOutcome};
use crate::services::parser;
use crate::services::templates::TemplateStore;
use crate::services::warehouse::SampleFetcher;

/// Samples processed between progress checkpoints and cancellation checks.
const CHUNK_SIZE: usize = 10;

/// Per-tenant sample cap for all-tenant jobs: the requested size, but never
/// more than half the tenant's activity (rounded up).
fn per_tenant_limit(sample_size: i32, activity_count: i64) -> i32 {
    let half_activity = (activity_count.max(0) + 1) / 2;
    (sample_size as i64).min(half_activity) as i32
}

/// Counters accumulated over one job execution.
#[derive(Default)]
struct ExecutionTally {
    processed: i32,
    failed: i32,
    score_sum: f64,
    scored_count: u32,
    low_count: u32,
    low_alerts_sent: u32,
}

/// Creates, runs, cancels, and backfills analysis jobs.
pub struct JobLifecycleManager {
    pool: DbPool,
    samples: Arc<dyn SampleFetcher>,
    analyzer: BatchAnalyzer,
    alerts: AlertDispatcher,
    templates: Arc<dyn TemplateStore>,
}

impl JobLifecycleManager {
    pub fn new(
        pool: DbPool,
        samples: Arc<dyn SampleFetcher>,
        analyzer: BatchAnalyzer,
        alerts: AlertDispatcher,
        templates: Arc<dyn TemplateStore>,
    ) -> Self {
        Self {
            pool,
            samples,
            analyzer,
            alerts,
            templates,
        }
    }

    /// Create a job in pending state with the winning template text
    /// snapshotted onto the row.
    pub async fn create_job(&self, request: CreateJobRequest) -> AppResult<Uuid> {
        if request.sample_size <= 0 {
            return Err(AppError::InvalidInput(
                "sample_size must be positive".to_string(),
            ));
        }

        let template_text = match request.prompt_template_id {
            Some(template_id) => self
                .templates
                .resolve(template_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Prompt template {}", template_id)))?,
            None => {
                self.templates
                    .resolve_default(request.tenant_id.as_deref())
                    .await?
            }
        };

        let id = Uuid::new_v4();
        self.pool
            .insert_job(
                id,
                request.target_date,
                request.tenant_id.clone(),
                request.sample_size,
                template_text,
            )
            .await?;

        info!(
            job_id = %id,
            target_date = %request.target_date,
            tenant_id = ?request.tenant_id,
            "Created analysis job"
        );

        Ok(id)
    }

    /// Claim the job and start execution in a detached task.
    ///
    /// Returns immediately with `running`; callers observe completion by
    /// re-reading the job. Two concurrent calls can never both claim the
    /// same job.
    pub async fn run_job(self: Arc<Self>, id: Uuid) -> AppResult<RunJobResponse> {
        self.pool.claim_job_for_run(id).await?;

        let manager = Arc::clone(&self);
        tokio::spawn(async move {
            manager.execute_job(id).await;
        });

        Ok(RunJobResponse {
            id,
            status: JobStatus::Running,
        })
    }

    /// Cancel a running job; the loop observes it between chunks.
    pub async fn cancel_job(&self, id: Uuid) -> AppResult<()> {
        self.pool.cancel_running_job(id).await?;
        info!(job_id = %id, "Job cancellation requested");
        Ok(())
    }

    /// Runs the full execution and records the terminal status.
    async fn execute_job(&self, id: Uuid) {
        match self.execute(id).await {
            Ok(()) => {}
            Err(e) => {
                error!(job_id = %id, "Job execution failed: {}", e);
                if let Err(finish_err) = self
                    .pool
                    .finish_job(id, JobStatus::Failed, Some(e.to_string()))
                    .await
                {
                    error!(job_id = %id, "Failed to record job failure: {}", finish_err);
                }
            }
        }
    }

    async fn execute(&self, id: Uuid) -> AppResult<()> {
        let job = self
            .pool
            .get_job_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {}", id)))?;

        let samples = self
            .collect_samples(job.tenant_id.as_deref(), job.target_date, job.sample_size)
            .await?;

        self.pool.set_job_total_items(id, samples.len() as i32).await?;

        if samples.is_empty() {
            info!(job_id = %id, "No samples for target date, completing immediately");
            self.pool.finish_job(id, JobStatus::Completed, None).await?;
            return Ok(());
        }

        info!(job_id = %id, total = samples.len(), "Starting analysis");

        let mut tally = ExecutionTally::default();

        for chunk in samples.chunks(CHUNK_SIZE) {
            // Cooperative cancellation: finished chunks stay persisted.
            if self.pool.get_job_status(id).await? == Some(JobStatus::Cancelled) {
                info!(
                    job_id = %id,
                    processed = tally.processed,
                    "Job cancelled, stopping before next chunk"
                );
                return Ok(());
            }

            let outcomes = self.analyzer.analyze_batch(chunk, &job.prompt_template).await;

            for (sample, outcome) in chunk.iter().zip(outcomes) {
                self.record_outcome(id, sample, outcome, &mut tally).await?;
            }

            self.pool
                .update_job_progress(id, tally.processed, tally.failed)
                .await?;
        }

        let completed = self
            .pool
            .finish_job(id, JobStatus::Completed, None)
            .await?;
        if !completed {
            // Cancelled underneath us during the final chunk; its results stay.
            info!(job_id = %id, "Job already terminal, skipping completion");
            return Ok(());
        }

        info!(
            job_id = %id,
            processed = tally.processed,
            failed = tally.failed,
            "Job completed"
        );

        if tally.scored_count > 0 {
            let avg = tally.score_sum / tally.scored_count as f64;
            self.alerts
                .job_completion(
                    id,
                    job.target_date,
                    avg,
                    tally.low_count,
                    tally.scored_count,
                )
                .await;
        }

        Ok(())
    }

    /// Samples for one execution: the tenant's own when scoped, otherwise a
    /// capped draw from every tenant active on the date.
    async fn collect_samples(
        &self,
        tenant_id: Option<&str>,
        target_date: NaiveDate,
        sample_size: i32,
    ) -> AppResult<Vec<ConversationSample>> {
        if let Some(tenant) = tenant_id {
            return self
                .samples
                .fetch_samples(Some(tenant), target_date, sample_size)
                .await;
        }

        let tenants = self.samples.fetch_active_tenants(target_date).await?;
        let mut all = Vec::new();

        for tenant in tenants {
            let limit = per_tenant_limit(sample_size, tenant.activity_count);
            if limit == 0 {
                continue;
            }

            let mut samples = self
                .samples
                .fetch_samples(Some(&tenant.tenant_id), target_date, limit)
                .await?;
            all.append(&mut samples);
        }

        Ok(all)
    }

    /// Parse, persist, and alert for one sample outcome.
    async fn record_outcome(
        &self,
        job_id: Uuid,
        sample: &ConversationSample,
        outcome: SampleOutcome,
        tally: &mut ExecutionTally,
    ) -> AppResult<()> {
        let parsed = match outcome.status {
            ResultStatus::Success => {
                tally.processed += 1;
                parser::parse(&outcome.content)
            }
            ResultStatus::Failed => {
                tally.failed += 1;
                ParsedAnalysis::default()
            }
        };

        if let Some(avg) = parsed.avg_score {
            tally.score_sum += avg;
            tally.scored_count += 1;
        }

        if parsed
            .quality_score
            .is_some_and(|s| s < crate::services::alerts::LOW_QUALITY_THRESHOLD)
        {
            tally.low_count += 1;
        }

        if outcome.status == ResultStatus::Success
            && should_alert_low_quality(&parsed, tally.low_alerts_sent)
        {
            tally.low_alerts_sent += 1;
            self.alerts
                .low_quality(&sample.tenant_id, &sample.user_query, &parsed)
                .await;
        }

        let row = analysis_result::Model {
            id: Uuid::new_v4(),
            job_id,
            original_timestamp: sample.timestamp,
            tenant_id: sample.tenant_id.clone(),
            session_id: sample.session_id.clone(),
            user_query: sample.user_query.clone(),
            model_reply: sample.model_reply.clone(),
            analysis_prompt: outcome.rendered_prompt,
            analysis_result: outcome.content,
            model_name: outcome.model_name,
            latency_ms: outcome.latency_ms,
            input_tokens: outcome.input_tokens,
            output_tokens: outcome.output_tokens,
            status: outcome.status.as_str().to_string(),
            error_message: outcome.error_message,
            quality_score: parsed.quality_score,
            relevance: parsed.relevance,
            completeness: parsed.completeness,
            clarity: parsed.clarity,
            avg_score: parsed.avg_score,
            sentiment: parsed.sentiment,
            summary_text: parsed.summary_text,
            issues: ParsedAnalysis::list_to_json(&parsed.issues),
            improvements: ParsedAnalysis::list_to_json(&parsed.improvements),
            missing_data: parsed
                .missing_data
                .as_deref()
                .map(ParsedAnalysis::list_to_json),
            issue_count: parsed.issue_count,
            created_at: Utc::now(),
        };

        self.pool.insert_result(row).await?;
        Ok(())
    }

    /// Backfill pass re-parsing rows whose structured fields were never
    /// extracted. Idempotent: rows that still do not parse stay eligible.
    pub async fn migrate_parse_fields(&self) -> AppResult<MigrateParseFieldsResponse> {
        let rows = self.pool.get_unparsed_results().await?;

        let mut updated = 0u64;
        let mut failed = 0u64;

        for row in rows {
            let parsed = parser::parse(&row.analysis_result);
            if parsed.is_empty() {
                failed += 1;
                continue;
            }

            self.pool.update_result_parsed_fields(row.id, &parsed).await?;
            updated += 1;
        }

        info!(updated, failed, "Parse-field backfill finished");

        Ok(MigrateParseFieldsResponse { updated, failed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult};
    use serde_json::json;

    use crate::entity::analysis_job;
    use crate::models::TenantActivity;
    use crate::services::alerts::{Alert, AlertSeverity, AlertSink, AlertSinkError};
    use crate::services::analyzer::{ChatMessage, Completion, CompletionError, CompletionService};
    use crate::services::warehouse::SampleFetcher;

    /// Warehouse fake: scripted per-call sample batches, recorded limits.
    struct StubFetcher {
        tenants: Vec<TenantActivity>,
        batches: Mutex<Vec<AppResult<Vec<ConversationSample>>>>,
        requested_limits: Mutex<Vec<i32>>,
    }

    fn fetcher(
        tenants: Vec<TenantActivity>,
        batches: Vec<AppResult<Vec<ConversationSample>>>,
    ) -> Arc<StubFetcher> {
        Arc::new(StubFetcher {
            tenants,
            batches: Mutex::new(batches),
            requested_limits: Mutex::new(Vec::new()),
        })
    }

    #[async_trait]
    impl SampleFetcher for StubFetcher {
        async fn fetch_samples(
            &self,
            _tenant_id: Option<&str>,
            _target_date: NaiveDate,
            limit: i32,
        ) -> AppResult<Vec<ConversationSample>> {
            self.requested_limits.lock().unwrap().push(limit);
            self.batches.lock().unwrap().remove(0)
        }

        async fn fetch_active_tenants(
            &self,
            _target_date: NaiveDate,
        ) -> AppResult<Vec<TenantActivity>> {
            Ok(self.tenants.clone())
        }
    }

    /// Scripted completion service: pops responses in order, counts calls.
    struct ScriptedService {
        responses: Mutex<Vec<Result<Completion, CompletionError>>>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl CompletionService for ScriptedService {
        async fn generate(&self, _messages: &[ChatMessage]) -> Result<Completion, CompletionError> {
            *self.calls.lock().unwrap() += 1;
            self.responses.lock().unwrap().remove(0)
        }
    }

    fn scored_completion(quality: f64) -> Result<Completion, CompletionError> {
        Ok(Completion {
            content: format!(
                r#"{{"quality_score": {q}, "relevance": {q}, "completeness": {q}, "clarity": {q}}}"#,
                q = quality
            ),
            model_name: "test-model".to_string(),
            latency_ms: 10,
            input_tokens: 5,
            output_tokens: 5,
        })
    }

    /// Records every alert it receives.
    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Alert>>,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn send(&self, alert: &Alert) -> Result<(), AlertSinkError> {
            self.sent.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    struct FixedTemplates;

    #[async_trait]
    impl TemplateStore for FixedTemplates {
        async fn resolve(&self, _id: Uuid) -> AppResult<Option<String>> {
            Ok(Some("{user_query}".to_string()))
        }

        async fn resolve_default(&self, _tenant_id: Option<&str>) -> AppResult<String> {
            Ok("{user_query}".to_string())
        }
    }

    fn sample(n: usize) -> ConversationSample {
        ConversationSample {
            timestamp: Utc::now(),
            tenant_id: "acme".to_string(),
            session_id: None,
            user_query: format!("question {}", n),
            model_reply: format!("answer {}", n),
        }
    }

    fn running_job(id: Uuid, tenant: Option<&str>, sample_size: i32) -> analysis_job::Model {
        let now = Utc::now();
        analysis_job::Model {
            id,
            status: "running".to_string(),
            target_date: NaiveDate::from_ymd_opt(2025, 1, 16).unwrap(),
            tenant_id: tenant.map(str::to_string),
            sample_size,
            prompt_template: "{user_query} / {model_reply}".to_string(),
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

    fn result_row(job_id: Uuid) -> analysis_result::Model {
        let now = Utc::now();
        analysis_result::Model {
            id: Uuid::new_v4(),
            job_id,
            original_timestamp: now,
            tenant_id: "acme".to_string(),
            session_id: None,
            user_query: "q".to_string(),
            model_reply: "a".to_string(),
            analysis_prompt: "p".to_string(),
            analysis_result: String::new(),
            model_name: None,
            latency_ms: 0,
            input_tokens: 0,
            output_tokens: 0,
            status: "success".to_string(),
            error_message: None,
            quality_score: None,
            relevance: None,
            completeness: None,
            clarity: None,
            avg_score: None,
            sentiment: None,
            summary_text: None,
            issues: json!([]),
            improvements: json!([]),
            missing_data: None,
            issue_count: 0,
            created_at: now,
        }
    }

    fn manager_with(
        db: DatabaseConnection,
        samples: Arc<StubFetcher>,
        responses: Vec<Result<Completion, CompletionError>>,
        sink: Arc<RecordingSink>,
    ) -> (JobLifecycleManager, Arc<ScriptedService>) {
        let completion = Arc::new(ScriptedService {
            responses: Mutex::new(responses),
            calls: Mutex::new(0),
        });
        let manager = JobLifecycleManager::new(
            DbPool::from_connection(db),
            samples,
            BatchAnalyzer::with_pause(completion.clone(), Duration::from_millis(0)),
            AlertDispatcher::new(Some(sink)),
            Arc::new(FixedTemplates),
        );
        (manager, completion)
    }

    #[tokio::test]
    async fn test_execution_tolerates_failed_sample_and_alerts_on_low_scores() {
        let job_id = Uuid::new_v4();
        let job = running_job(job_id, Some("acme"), 10);

        // One chunk of ten: job read, total read+update, one cancellation
        // check, ten result inserts, progress read+update, then the
        // conditional terminal transition.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([
                vec![job.clone()],
                vec![job.clone()],
                vec![job.clone()],
                vec![job.clone()],
            ])
            .append_query_results((0..10).map(|_| vec![result_row(job_id)]).collect::<Vec<_>>())
            .append_query_results([vec![job.clone()], vec![job.clone()]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let samples = fetcher(vec![], vec![Ok((0..10).map(sample).collect())]);
        let mut responses: Vec<_> = (0..10).map(|_| scored_completion(1.0)).collect();
        responses[2] = Err(CompletionError("quota exceeded".to_string()));

        let sink = Arc::new(RecordingSink::default());
        let (manager, completion) = manager_with(db, samples, responses, sink.clone());

        manager.execute(job_id).await.unwrap();

        // The failed third sample never fails the job
        assert_eq!(*completion.calls.lock().unwrap(), 10);

        // Nine successes at quality 1.0: low-quality alerts cap at five,
        // then one completion summary over the nine scored results
        let alerts = sink.sent.lock().unwrap();
        assert_eq!(alerts.len(), 6);
        for alert in alerts.iter().take(5) {
            assert_eq!(alert.severity, AlertSeverity::Critical);
            assert!(alert.title.contains("Low quality"));
        }
        let summary = alerts.last().unwrap();
        assert_eq!(summary.severity, AlertSeverity::Critical);
        assert!(summary.message.contains("over 9 results (9 low-quality)"));
    }

    #[tokio::test]
    async fn test_cancellation_is_observed_between_chunks() {
        let job_id = Uuid::new_v4();
        let job = running_job(job_id, Some("acme"), 12);
        let mut cancelled = job.clone();
        cancelled.status = "cancelled".to_string();

        // Twelve samples span two chunks; the status check before the second
        // chunk sees the cancel, so only the first ten samples are analyzed.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([
                vec![job.clone()],
                vec![job.clone()],
                vec![job.clone()],
                vec![job.clone()],
            ])
            .append_query_results((0..10).map(|_| vec![result_row(job_id)]).collect::<Vec<_>>())
            .append_query_results([vec![job.clone()], vec![job.clone()], vec![cancelled]])
            .into_connection();

        let samples = fetcher(vec![], vec![Ok((0..12).map(sample).collect())]);
        let responses: Vec<_> = (0..10).map(|_| scored_completion(8.0)).collect();

        let sink = Arc::new(RecordingSink::default());
        let (manager, completion) = manager_with(db, samples, responses, sink.clone());

        manager.execute(job_id).await.unwrap();

        assert_eq!(*completion.calls.lock().unwrap(), 10);
        // No terminal transition, so no completion alert either
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sample_fetch_failure_fails_the_job() {
        let job_id = Uuid::new_v4();
        let job = running_job(job_id, None, 100);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![job]])
            .into_connection();

        let samples = fetcher(
            vec![TenantActivity {
                tenant_id: "acme".to_string(),
                activity_count: 10,
            }],
            vec![Err(AppError::Warehouse("warehouse down".to_string()))],
        );

        let sink = Arc::new(RecordingSink::default());
        let (manager, completion) = manager_with(db, samples, vec![], sink);

        match manager.execute(job_id).await {
            Err(AppError::Warehouse(_)) => {}
            other => panic!("Expected Warehouse error, got {:?}", other.map(|_| ())),
        }
        assert_eq!(*completion.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_all_tenant_job_applies_adaptive_limits() {
        let job_id = Uuid::new_v4();
        let job = running_job(job_id, None, 100);

        // Empty batches: the job completes with zero items, but the fetch
        // limits show the per-tenant cap at work
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![job.clone()], vec![job.clone()], vec![job.clone()]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let samples = fetcher(
            vec![
                TenantActivity {
                    tenant_id: "small".to_string(),
                    activity_count: 10,
                },
                TenantActivity {
                    tenant_id: "large".to_string(),
                    activity_count: 500,
                },
            ],
            vec![Ok(vec![]), Ok(vec![])],
        );

        let sink = Arc::new(RecordingSink::default());
        let (manager, completion) = manager_with(db, samples.clone(), vec![], sink.clone());

        manager.execute(job_id).await.unwrap();

        assert_eq!(*samples.requested_limits.lock().unwrap(), vec![5, 100]);
        assert_eq!(*completion.calls.lock().unwrap(), 0);
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_per_tenant_limit_caps_at_half_activity() {
        // 10 recorded turns: at most 5 samples regardless of the request
        assert_eq!(per_tenant_limit(100, 10), 5);
        assert_eq!(per_tenant_limit(3, 10), 3);
    }

    #[test]
    fn test_per_tenant_limit_rounds_half_up() {
        assert_eq!(per_tenant_limit(100, 9), 5);
        assert_eq!(per_tenant_limit(100, 1), 1);
    }

    #[test]
    fn test_per_tenant_limit_with_plenty_of_activity() {
        assert_eq!(per_tenant_limit(100, 500), 100);
    }

    #[test]
    fn test_per_tenant_limit_zero_activity() {
        assert_eq!(per_tenant_limit(100, 0), 0);
    }

    #[test]
    fn test_per_tenant_limits_sum_across_tenants() {
        // Two tenants with activity 10 and 500 at a requested size of 100:
        // 5 + 100 samples overall.
        let total: i32 = [10i64, 500]
            .into_iter()
            .map(|activity| per_tenant_limit(100, activity))
            .sum();
        assert_eq!(total, 105);
    }
}
