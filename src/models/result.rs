//! Analysis result models and DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::analysis_result;

/// Per-sample outcome status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    /// Collaborator call succeeded and raw output was stored.
    Success,
    /// Collaborator call failed; error_message is set, latency/tokens are zero.
    Failed,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured fields extracted from raw analysis output.
///
/// Every field defaults to absent/empty; the parser never fails and instead
/// returns this default when the raw text is malformed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ParsedAnalysis {
    pub quality_score: Option<f64>,
    pub relevance: Option<f64>,
    pub completeness: Option<f64>,
    pub clarity: Option<f64>,
    /// Mean over whichever of the four scores are present.
    pub avg_score: Option<f64>,
    pub sentiment: Option<String>,
    pub summary_text: Option<String>,
    pub issues: Vec<String>,
    pub improvements: Vec<String>,
    pub missing_data: Option<Vec<String>>,
    pub issue_count: i32,
}

impl ParsedAnalysis {
    /// True when no field was extracted at all.
    pub fn is_empty(&self) -> bool {
        self.quality_score.is_none()
            && self.relevance.is_none()
            && self.completeness.is_none()
            && self.clarity.is_none()
            && self.sentiment.is_none()
            && self.summary_text.is_none()
            && self.issues.is_empty()
            && self.improvements.is_empty()
            && self.missing_data.is_none()
    }

    /// Serialize a string list to the JSONB column representation.
    pub fn list_to_json(list: &[String]) -> JsonValue {
        serde_json::to_value(list).unwrap_or_else(|_| JsonValue::Array(vec![]))
    }

    /// Deserialize a JSONB column back into a string list.
    pub fn list_from_json(value: &JsonValue) -> Vec<String> {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }
}

/// Result row response for job detail listings.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ResultResponse {
    pub id: Uuid,
    pub job_id: Uuid,
    pub original_timestamp: DateTime<Utc>,
    pub tenant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub user_query: String,
    pub model_reply: String,
    pub status: ResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    pub latency_ms: i64,
    pub input_tokens: i32,
    pub output_tokens: i32,
    pub parsed: ParsedAnalysis,
    pub created_at: DateTime<Utc>,
}

impl From<analysis_result::Model> for ResultResponse {
    fn from(model: analysis_result::Model) -> Self {
        let status = ResultStatus::parse(&model.status).unwrap_or(ResultStatus::Failed);
        let parsed = ParsedAnalysis {
            quality_score: model.quality_score,
            relevance: model.relevance,
            completeness: model.completeness,
            clarity: model.clarity,
            avg_score: model.avg_score,
            sentiment: model.sentiment,
            summary_text: model.summary_text,
            issues: ParsedAnalysis::list_from_json(&model.issues),
            improvements: ParsedAnalysis::list_from_json(&model.improvements),
            missing_data: model
                .missing_data
                .as_ref()
                .map(ParsedAnalysis::list_from_json),
            issue_count: model.issue_count,
        };
        Self {
            id: model.id,
            job_id: model.job_id,
            original_timestamp: model.original_timestamp,
            tenant_id: model.tenant_id,
            session_id: model.session_id,
            user_query: model.user_query,
            model_reply: model.model_reply,
            status,
            error_message: model.error_message,
            model_name: model.model_name,
            latency_ms: model.latency_ms,
            input_tokens: model.input_tokens,
            output_tokens: model.output_tokens,
            parsed,
            created_at: model.created_at,
        }
    }
}

/// Paged result listing for a job.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ResultListResponse {
    pub results: Vec<ResultResponse>,
    pub total: u64,
    pub limit: i32,
    pub offset: i32,
}
