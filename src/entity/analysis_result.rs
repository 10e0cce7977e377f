//! Analysis result entity for SeaORM.
//!
//! One row per sampled conversation within a job. Immutable after insertion,
//! except for the parse-field backfill which re-runs the parser over rows
//! whose structured fields are still empty.

use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "analysis_results")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub job_id: Uuid,
    /// Timestamp of the original conversation turn
    pub original_timestamp: DateTimeUtc,
    pub tenant_id: String,
    pub session_id: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub user_query: String,
    #[sea_orm(column_type = "Text")]
    pub model_reply: String,
    /// Fully rendered prompt as sent to the completion service
    #[sea_orm(column_type = "Text")]
    pub analysis_prompt: String,
    /// Raw completion output (empty on content failure)
    #[sea_orm(column_type = "Text")]
    pub analysis_result: String,
    pub model_name: Option<String>,
    pub latency_ms: i64,
    pub input_tokens: i32,
    pub output_tokens: i32,
    /// Per-sample outcome: success, failed
    pub status: String,
    pub error_message: Option<String>,
    // Parsed fields (all absent when the raw output is malformed)
    pub quality_score: Option<f64>,
    pub relevance: Option<f64>,
    pub completeness: Option<f64>,
    pub clarity: Option<f64>,
    pub avg_score: Option<f64>,
    pub sentiment: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub summary_text: Option<String>,
    #[sea_orm(column_type = "JsonBinary")]
    pub issues: JsonValue,
    #[sea_orm(column_type = "JsonBinary")]
    pub improvements: JsonValue,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub missing_data: Option<JsonValue>,
    pub issue_count: i32,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::analysis_job::Entity",
        from = "Column::JobId",
        to = "super::analysis_job::Column::Id",
        on_delete = "Cascade"
    )]
    Job,
}

impl Related<super::analysis_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Job.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
