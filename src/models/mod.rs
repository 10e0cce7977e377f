//! Domain models and DTOs.

pub mod job;
pub mod result;
pub mod sample;
pub mod schedule;

pub use job::{
    CreateJobRequest, JobDetailResponse, JobListResponse, JobStatus, JobSummaryResponse,
    MigrateParseFieldsResponse, QueryJobsParams, RunJobResponse,
};
pub use result::{ParsedAnalysis, ResultListResponse, ResultResponse, ResultStatus};
pub use sample::{ConversationSample, TenantActivity};
pub use schedule::ScheduleTriggerResponse;
