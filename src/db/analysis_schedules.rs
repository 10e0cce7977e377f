//! Database queries for analysis schedules.

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use uuid::Uuid;

use crate::entity::analysis_schedule::{self as schedule, Entity as Schedule};
use crate::error::{AppError, AppResult};

use super::DbPool;

impl DbPool {
    /// Get a schedule by ID.
    pub async fn get_schedule_by_id(&self, id: Uuid) -> AppResult<Option<schedule::Model>> {
        let result = Schedule::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get schedule: {}", e)))?;

        Ok(result)
    }

    /// All enabled schedules, for trigger registration at startup.
    pub async fn list_enabled_schedules(&self) -> AppResult<Vec<schedule::Model>> {
        let results = Schedule::find()
            .filter(schedule::Column::IsEnabled.eq(true))
            .order_by_asc(schedule::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list schedules: {}", e)))?;

        Ok(results)
    }
}
