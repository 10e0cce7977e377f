//! Schedule DTOs for the trigger registry endpoints.

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Response for schedule trigger registry operations.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScheduleTriggerResponse {
    /// Schedule UUID.
    pub schedule_id: Uuid,
    /// True when a live trigger is registered after the operation.
    pub registered: bool,
}
