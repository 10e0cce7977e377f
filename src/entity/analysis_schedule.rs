//! Analysis schedule entity for SeaORM.

use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "analysis_schedules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub is_enabled: bool,
    /// Local fire hour, 0-23
    pub hour: i32,
    /// Local fire minute, 0-59
    pub minute: i32,
    /// Weekday numbers, 0 = Sunday through 6 = Saturday; empty means every day
    #[sea_orm(column_type = "JsonBinary")]
    pub days_of_week: JsonValue,
    /// IANA timezone name the fire time is interpreted in
    pub time_zone: String,
    pub target_tenant_id: Option<String>,
    pub sample_size: i32,
    pub prompt_template_id: Option<Uuid>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
