//! Analysis job entity for SeaORM.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "analysis_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Lifecycle status: pending, running, completed, failed, cancelled
    pub status: String,
    /// Calendar day whose conversations are sampled
    pub target_date: Date,
    /// Tenant scope; NULL means every tenant with activity on the target date
    pub tenant_id: Option<String>,
    /// Requested samples per tenant
    pub sample_size: i32,
    /// Snapshot of the prompt template text taken at creation time
    #[sea_orm(column_type = "Text")]
    pub prompt_template: String,
    pub total_items: i32,
    pub processed_items: i32,
    pub failed_items: i32,
    /// Set when status is 'failed' (orchestration error)
    pub error_message: Option<String>,
    pub started_at: Option<DateTimeUtc>,
    pub completed_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::analysis_result::Entity")]
    Results,
}

impl Related<super::analysis_result::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Results.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
