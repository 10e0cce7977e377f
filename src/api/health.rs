//! Health and readiness endpoints.
//!
//! Liveness reports the running binary; readiness additionally requires a
//! database round trip and reports the schedule trigger registry state, so an
//! operator can tell a booted-but-idle instance from one that is actually
//! firing schedules.

use actix_web::{HttpResponse, get, web};
use chrono::Utc;
use sea_orm::ConnectionTrait;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::DbPool;
use crate::error::ErrorResponse;
use crate::services::ScheduleRegistry;

/// Liveness response.
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: String,
}

/// Readiness response.
#[derive(Serialize, ToSchema)]
pub struct ReadyResponse {
    status: &'static str,
    database: &'static str,
    /// Schedule triggers currently registered with the scheduler.
    registered_triggers: usize,
}

/// Liveness probe: the process is up and serving.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is running", body = HealthResponse)
    )
)]
#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness probe: database reachable, trigger registry reporting.
#[utoipa::path(
    get,
    path = "/api/v1/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Database unreachable", body = ErrorResponse)
    )
)]
#[get("/ready")]
pub async fn ready(
    pool: web::Data<DbPool>,
    registry: web::Data<ScheduleRegistry>,
) -> HttpResponse {
    if let Err(e) = pool.connection().execute_unprepared("SELECT 1").await {
        tracing::warn!("Readiness check failed: {}", e);
        return HttpResponse::ServiceUnavailable().json(ErrorResponse {
            error: "NOT_READY".to_string(),
            message: "Database connection failed".to_string(),
        });
    }

    HttpResponse::Ok().json(ReadyResponse {
        status: "ready",
        database: "connected",
        registered_triggers: registry.trigger_count().await,
    })
}

/// Configure health routes.
pub fn configure_health_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health).service(ready);
}
