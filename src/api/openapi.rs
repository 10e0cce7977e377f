//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::{api, error, models};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Conversation Quality Analysis Server",
        version = "0.3.0",
        description = "Batch analysis of conversation quality: sampled user/assistant exchanges are scored by a completion service on a manual or scheduled basis"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Health endpoints
        api::health::health,
        api::health::ready,
        // Job endpoints
        api::jobs::create_job,
        api::jobs::run_job,
        api::jobs::cancel_job,
        api::jobs::get_job,
        api::jobs::list_jobs,
        api::jobs::get_job_results,
        api::jobs::migrate_parse_fields,
        // Schedule endpoints
        api::schedules::reload_schedule,
        api::schedules::remove_trigger,
    ),
    components(
        schemas(
            // Common
            error::ErrorResponse,
            // Health
            api::health::HealthResponse,
            api::health::ReadyResponse,
            // Jobs
            models::JobStatus,
            models::CreateJobRequest,
            models::RunJobResponse,
            models::JobDetailResponse,
            models::JobSummaryResponse,
            models::JobListResponse,
            models::QueryJobsParams,
            models::MigrateParseFieldsResponse,
            // Results
            models::ResultStatus,
            models::ParsedAnalysis,
            models::ResultResponse,
            models::ResultListResponse,
            // Samples
            models::ConversationSample,
            models::TenantActivity,
            // Schedules
            models::ScheduleTriggerResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Jobs", description = "Analysis job lifecycle and results"),
        (name = "Schedules", description = "Schedule trigger registry")
    )
)]
pub struct ApiDoc;
