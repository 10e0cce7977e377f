//! Job domain models and DTOs.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::entity::analysis_job;

/// Job lifecycle status.
///
/// Within one execution the status only moves forward:
/// pending -> running -> completed/failed, or running -> cancelled.
/// `run_job` may re-claim a terminal job for a fresh execution; it can never
/// claim a job that is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job created, waiting for run_job.
    Pending,
    /// Execution in progress.
    Running,
    /// All chunks processed (individual sample failures included).
    Completed,
    /// Orchestration error (sample fetch or persistence failed).
    Failed,
    /// Cancelled by an operator; observed between chunks.
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether a transition is legal within a single execution.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
        )
    }

    /// Whether this status marks a finished execution.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Request to create a new analysis job.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateJobRequest {
    /// Calendar day whose conversations are sampled.
    pub target_date: NaiveDate,
    /// Tenant scope; omit to cover every tenant active on the target date.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Requested samples per tenant.
    pub sample_size: i32,
    /// Explicit prompt template; omit to use the tenant/global default.
    #[serde(default)]
    pub prompt_template_id: Option<Uuid>,
}

/// Response after triggering job execution.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RunJobResponse {
    /// Job UUID.
    pub id: Uuid,
    /// Always `running`; completion is observed by re-reading the job.
    pub status: JobStatus,
}

/// Detailed job response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobDetailResponse {
    /// Job UUID.
    pub id: Uuid,
    /// Job status.
    pub status: JobStatus,
    /// Target date.
    pub target_date: NaiveDate,
    /// Tenant scope (absent = all active tenants).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Requested samples per tenant.
    pub sample_size: i32,
    /// Total samples fetched for this run.
    pub total_items: i32,
    /// Samples analyzed successfully.
    pub processed_items: i32,
    /// Samples whose collaborator call failed.
    pub failed_items: i32,
    /// Error message if status is failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<analysis_job::Model> for JobDetailResponse {
    fn from(model: analysis_job::Model) -> Self {
        let status = JobStatus::parse(&model.status).unwrap_or(JobStatus::Failed);
        Self {
            id: model.id,
            status,
            target_date: model.target_date,
            tenant_id: model.tenant_id,
            sample_size: model.sample_size,
            total_items: model.total_items,
            processed_items: model.processed_items,
            failed_items: model.failed_items,
            error_message: model.error_message,
            started_at: model.started_at,
            completed_at: model.completed_at,
            created_at: model.created_at,
        }
    }
}

/// Job summary for listings, including the per-job score aggregate.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobSummaryResponse {
    pub id: Uuid,
    pub status: JobStatus,
    pub target_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    pub total_items: i32,
    pub processed_items: i32,
    pub failed_items: i32,
    /// Mean avg_score over this job's scored successful results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Job list response with pagination.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobListResponse {
    pub jobs: Vec<JobSummaryResponse>,
    /// Total number of jobs matching filter.
    pub total: u64,
    pub limit: i32,
    pub offset: i32,
}

/// Query parameters for listing jobs.
#[derive(Debug, Clone, Deserialize, ToSchema, IntoParams)]
pub struct QueryJobsParams {
    /// Filter by status.
    #[serde(default)]
    pub status: Option<JobStatus>,
    /// Filter by tenant.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Filter by target date.
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
    /// Filter by creation time, inclusive lower bound.
    #[serde(default)]
    pub from_date: Option<DateTime<Utc>>,
    /// Filter by creation time, inclusive upper bound.
    #[serde(default)]
    pub to_date: Option<DateTime<Utc>>,
    /// Maximum results to return.
    #[serde(default = "default_limit")]
    pub limit: i32,
    /// Offset for pagination.
    #[serde(default)]
    pub offset: i32,
}

fn default_limit() -> i32 {
    20
}

/// Response of the parse-field backfill pass.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MigrateParseFieldsResponse {
    /// Rows whose parsed fields were populated.
    pub updated: u64,
    /// Rows whose raw text still does not parse.
    pub failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("unknown"), None);
    }

    #[test]
    fn test_legal_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Cancelled));
    }

    #[test]
    fn test_illegal_transitions() {
        // No backward moves within an execution
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Cancelled.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Pending));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }
}
