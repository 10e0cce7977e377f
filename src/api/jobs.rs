//! Job API handlers.

use actix_web::{HttpResponse, get, post, web};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{
    CreateJobRequest, JobDetailResponse, JobListResponse, JobStatus, JobSummaryResponse,
    QueryJobsParams, ResultListResponse, ResultResponse,
};
use crate::services::JobLifecycleManager;

/// Pagination parameters for the result listing.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ResultsQuery {
    #[serde(default = "default_results_limit")]
    pub limit: i32,
    #[serde(default)]
    pub offset: i32,
}

fn default_results_limit() -> i32 {
    50
}

/// Create an analysis job.
///
/// The job is created in pending state with the resolved prompt template
/// snapshotted onto it; execution starts only on the run endpoint.
#[utoipa::path(
    post,
    path = "/api/v1/jobs",
    tag = "Jobs",
    request_body = CreateJobRequest,
    responses(
        (status = 201, description = "Job created", body = JobDetailResponse),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 404, description = "Prompt template not found", body = crate::error::ErrorResponse),
    )
)]
#[post("/jobs")]
pub async fn create_job(
    manager: web::Data<JobLifecycleManager>,
    pool: web::Data<DbPool>,
    request: web::Json<CreateJobRequest>,
) -> AppResult<HttpResponse> {
    let id = manager.create_job(request.into_inner()).await?;

    let job = pool
        .get_job_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {}", id)))?;

    Ok(HttpResponse::Created().json(JobDetailResponse::from(job)))
}

/// Start executing a job.
///
/// Returns immediately; progress and the terminal status are observed via
/// the job detail endpoint. Re-running a finished job starts a fresh
/// execution with reset counters.
#[utoipa::path(
    post,
    path = "/api/v1/jobs/{id}/run",
    tag = "Jobs",
    params(
        ("id" = Uuid, Path, description = "Job UUID")
    ),
    responses(
        (status = 202, description = "Execution started", body = crate::models::RunJobResponse),
        (status = 404, description = "Job not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Job already running", body = crate::error::ErrorResponse),
    )
)]
#[post("/jobs/{id}/run")]
pub async fn run_job(
    manager: web::Data<JobLifecycleManager>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let response = manager.into_inner().run_job(path.into_inner()).await?;
    Ok(HttpResponse::Accepted().json(response))
}

/// Cancel a running job.
///
/// Cancellation is cooperative: the in-flight chunk finishes and its results
/// are kept, then the execution loop stops.
#[utoipa::path(
    post,
    path = "/api/v1/jobs/{id}/cancel",
    tag = "Jobs",
    params(
        ("id" = Uuid, Path, description = "Job UUID")
    ),
    responses(
        (status = 200, description = "Cancellation recorded", body = JobDetailResponse),
        (status = 404, description = "Job not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Job is not running", body = crate::error::ErrorResponse),
    )
)]
#[post("/jobs/{id}/cancel")]
pub async fn cancel_job(
    manager: web::Data<JobLifecycleManager>,
    pool: web::Data<DbPool>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    manager.cancel_job(id).await?;

    let job = pool
        .get_job_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {}", id)))?;

    Ok(HttpResponse::Ok().json(JobDetailResponse::from(job)))
}

/// Get job details.
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}",
    tag = "Jobs",
    params(
        ("id" = Uuid, Path, description = "Job UUID")
    ),
    responses(
        (status = 200, description = "Job details", body = JobDetailResponse),
        (status = 404, description = "Job not found", body = crate::error::ErrorResponse),
    )
)]
#[get("/jobs/{id}")]
pub async fn get_job(pool: web::Data<DbPool>, path: web::Path<Uuid>) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let job = pool
        .get_job_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {}", id)))?;

    Ok(HttpResponse::Ok().json(JobDetailResponse::from(job)))
}

/// List jobs with filtering and pagination.
///
/// Each summary carries the mean score over the job's scored results,
/// computed in one batch query for the whole page.
#[utoipa::path(
    get,
    path = "/api/v1/jobs",
    tag = "Jobs",
    params(QueryJobsParams),
    responses(
        (status = 200, description = "Job list", body = JobListResponse)
    )
)]
#[get("/jobs")]
pub async fn list_jobs(
    pool: web::Data<DbPool>,
    query: web::Query<QueryJobsParams>,
) -> AppResult<HttpResponse> {
    let params = query.into_inner();
    let (jobs, total) = pool.query_jobs(&params).await?;

    let ids: Vec<Uuid> = jobs.iter().map(|j| j.id).collect();
    let scores = pool.avg_scores_for_jobs(&ids).await?;

    let summaries = jobs
        .into_iter()
        .map(|job| {
            let avg_score = scores.get(&job.id).copied();
            JobSummaryResponse {
                id: job.id,
                status: JobStatus::parse(&job.status).unwrap_or(JobStatus::Failed),
                target_date: job.target_date,
                tenant_id: job.tenant_id,
                total_items: job.total_items,
                processed_items: job.processed_items,
                failed_items: job.failed_items,
                avg_score,
                created_at: job.created_at,
            }
        })
        .collect();

    Ok(HttpResponse::Ok().json(JobListResponse {
        jobs: summaries,
        total,
        limit: params.limit,
        offset: params.offset,
    }))
}

/// List a job's analysis results, oldest first.
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}/results",
    tag = "Jobs",
    params(
        ("id" = Uuid, Path, description = "Job UUID"),
        ResultsQuery
    ),
    responses(
        (status = 200, description = "Result list", body = ResultListResponse),
        (status = 404, description = "Job not found", body = crate::error::ErrorResponse),
    )
)]
#[get("/jobs/{id}/results")]
pub async fn get_job_results(
    pool: web::Data<DbPool>,
    path: web::Path<Uuid>,
    query: web::Query<ResultsQuery>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();

    // 404 for unknown jobs rather than an empty page
    if pool.get_job_by_id(id).await?.is_none() {
        return Err(AppError::NotFound(format!("Job {}", id)));
    }

    let (results, total) = pool.get_results_for_job(id, query.limit, query.offset).await?;

    Ok(HttpResponse::Ok().json(ResultListResponse {
        results: results.into_iter().map(ResultResponse::from).collect(),
        total,
        limit: query.limit,
        offset: query.offset,
    }))
}

/// Backfill parsed fields on historical results.
///
/// Re-parses rows whose raw analysis text never produced structured fields.
/// Idempotent and safe to run repeatedly.
#[utoipa::path(
    post,
    path = "/api/v1/jobs/migrate-parse-fields",
    tag = "Jobs",
    responses(
        (status = 200, description = "Backfill finished", body = crate::models::MigrateParseFieldsResponse)
    )
)]
#[post("/jobs/migrate-parse-fields")]
pub async fn migrate_parse_fields(
    manager: web::Data<JobLifecycleManager>,
) -> AppResult<HttpResponse> {
    let response = manager.migrate_parse_fields().await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Configure job routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    // migrate-parse-fields before the {id} routes so it is not captured as an id
    cfg.service(migrate_parse_fields)
        .service(create_job)
        .service(list_jobs)
        .service(run_job)
        .service(cancel_job)
        .service(get_job_results)
        .service(get_job);
}
