//! Schedule trigger registry handlers.

use actix_web::{HttpResponse, delete, post, web};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::ScheduleTriggerResponse;
use crate::services::ScheduleRegistry;

/// Reconcile a schedule's trigger with its database row.
///
/// Call after creating or editing a schedule row. Enabled schedules get a
/// (re)registered trigger; disabled ones have any trigger removed.
#[utoipa::path(
    post,
    path = "/api/v1/schedules/{id}/reload",
    tag = "Schedules",
    params(
        ("id" = Uuid, Path, description = "Schedule UUID")
    ),
    responses(
        (status = 200, description = "Trigger reconciled", body = ScheduleTriggerResponse),
        (status = 400, description = "Invalid schedule definition", body = crate::error::ErrorResponse),
        (status = 404, description = "Schedule not found", body = crate::error::ErrorResponse),
    )
)]
#[post("/schedules/{id}/reload")]
pub async fn reload_schedule(
    registry: web::Data<ScheduleRegistry>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let schedule_id = path.into_inner();
    let registered = registry.reload(schedule_id).await?;

    Ok(HttpResponse::Ok().json(ScheduleTriggerResponse {
        schedule_id,
        registered,
    }))
}

/// Remove a schedule's trigger without touching the database row.
#[utoipa::path(
    delete,
    path = "/api/v1/schedules/{id}/trigger",
    tag = "Schedules",
    params(
        ("id" = Uuid, Path, description = "Schedule UUID")
    ),
    responses(
        (status = 200, description = "Trigger removed (or was not registered)", body = ScheduleTriggerResponse),
    )
)]
#[delete("/schedules/{id}/trigger")]
pub async fn remove_trigger(
    registry: web::Data<ScheduleRegistry>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let schedule_id = path.into_inner();
    registry.remove(schedule_id).await?;

    Ok(HttpResponse::Ok().json(ScheduleTriggerResponse {
        schedule_id,
        registered: false,
    }))
}

/// Configure schedule routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(reload_schedule).service(remove_trigger);
}
