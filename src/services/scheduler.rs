//! Schedule trigger registry on top of tokio-cron-scheduler.
//!
//! Database rows in analysis_schedules are the source of truth; this registry
//! mirrors the enabled ones as in-process cron triggers. Each trigger re-reads
//! its schedule row when it fires, so edits to tenant scope or sample size
//! take effect without re-registration.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Days, Utc};
use chrono_tz::Tz;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entity::analysis_schedule as schedule;
use crate::error::{AppError, AppResult};
use crate::models::CreateJobRequest;
use crate::services::jobs::JobLifecycleManager;

/// Mirrors enabled schedules as cron triggers.
pub struct ScheduleRegistry {
    scheduler: JobScheduler,
    pool: DbPool,
    jobs: Arc<JobLifecycleManager>,
    /// schedule id -> currently registered trigger id
    triggers: Mutex<HashMap<Uuid, Uuid>>,
}

impl ScheduleRegistry {
    pub async fn new(pool: DbPool, jobs: Arc<JobLifecycleManager>) -> AppResult<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler,
            pool,
            jobs,
            triggers: Mutex::new(HashMap::new()),
        })
    }

    /// Start firing registered triggers.
    pub async fn start(&self) -> AppResult<()> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to start scheduler: {}", e)))?;
        Ok(())
    }

    /// Register every enabled schedule. A single bad row (unknown timezone,
    /// malformed days) is logged and skipped so the rest still register.
    pub async fn register_all(&self) -> AppResult<usize> {
        let schedules = self.pool.list_enabled_schedules().await?;
        let mut registered = 0;

        for row in schedules {
            let id = row.id;
            match self.register(&row).await {
                Ok(()) => registered += 1,
                Err(e) => error!(schedule_id = %id, "Failed to register schedule: {}", e),
            }
        }

        info!(registered, "Schedule triggers registered");
        Ok(registered)
    }

    /// Register (or replace) the trigger for one schedule row.
    pub async fn register(&self, row: &schedule::Model) -> AppResult<()> {
        let tz: Tz = row
            .time_zone
            .parse()
            .map_err(|_| AppError::InvalidInput(format!("Unknown timezone: {}", row.time_zone)))?;

        let days = days_from_json(&row.days_of_week);
        let expr = cron_expression(row.hour, row.minute, &days);

        let schedule_id = row.id;
        let pool = self.pool.clone();
        let jobs = Arc::clone(&self.jobs);

        let job = Job::new_async_tz(expr.as_str(), tz, move |_trigger_id, _scheduler| {
            let pool = pool.clone();
            let jobs = Arc::clone(&jobs);
            Box::pin(async move {
                fire_schedule(pool, jobs, schedule_id).await;
            })
        })
        .map_err(|e| AppError::Scheduler(format!("Invalid trigger for {}: {}", expr, e)))?;

        let trigger_id = self
            .scheduler
            .add(job)
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to add trigger: {}", e)))?;

        // Replace atomically under the lock, then drop any previous trigger.
        let previous = self.triggers.lock().await.insert(schedule_id, trigger_id);
        if let Some(old) = previous {
            if let Err(e) = self.scheduler.remove(&old).await {
                warn!(schedule_id = %schedule_id, "Failed to remove stale trigger: {}", e);
            }
        }

        info!(schedule_id = %schedule_id, cron = %expr, tz = %row.time_zone, "Trigger registered");
        Ok(())
    }

    /// Re-read one schedule and reconcile its trigger.
    ///
    /// Returns whether a trigger is registered afterwards. A deleted schedule
    /// drops any orphaned trigger and reports NotFound.
    pub async fn reload(&self, schedule_id: Uuid) -> AppResult<bool> {
        match self.pool.get_schedule_by_id(schedule_id).await? {
            Some(row) if row.is_enabled => {
                self.register(&row).await?;
                Ok(true)
            }
            Some(_) => {
                self.remove(schedule_id).await?;
                Ok(false)
            }
            None => {
                self.remove(schedule_id).await?;
                Err(AppError::NotFound(format!("Schedule {}", schedule_id)))
            }
        }
    }

    /// Number of live triggers currently registered.
    pub async fn trigger_count(&self) -> usize {
        self.triggers.lock().await.len()
    }

    /// Drop the trigger for a schedule if one is registered. Idempotent.
    pub async fn remove(&self, schedule_id: Uuid) -> AppResult<bool> {
        let removed = self.triggers.lock().await.remove(&schedule_id);

        match removed {
            Some(trigger_id) => {
                self.scheduler
                    .remove(&trigger_id)
                    .await
                    .map_err(|e| AppError::Scheduler(format!("Failed to remove trigger: {}", e)))?;
                info!(schedule_id = %schedule_id, "Trigger removed");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Fires one schedule: creates and starts a job for the previous day in the
/// schedule's timezone. All failures are logged, never propagated into the
/// scheduler runtime.
async fn fire_schedule(pool: DbPool, jobs: Arc<JobLifecycleManager>, schedule_id: Uuid) {
    // Re-read so edits since registration are honored.
    let row = match pool.get_schedule_by_id(schedule_id).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            warn!(schedule_id = %schedule_id, "Schedule deleted, trigger is stale");
            return;
        }
        Err(e) => {
            error!(schedule_id = %schedule_id, "Failed to load schedule: {}", e);
            return;
        }
    };

    if !row.is_enabled {
        info!(schedule_id = %schedule_id, "Schedule disabled, skipping fire");
        return;
    }

    let tz: Tz = match row.time_zone.parse() {
        Ok(tz) => tz,
        Err(_) => {
            error!(schedule_id = %schedule_id, "Unknown timezone: {}", row.time_zone);
            return;
        }
    };

    let today = Utc::now().with_timezone(&tz).date_naive();
    let target_date = today.checked_sub_days(Days::new(1)).unwrap_or(today);

    info!(
        schedule_id = %schedule_id,
        name = %row.name,
        target_date = %target_date,
        "Schedule fired"
    );

    let request = CreateJobRequest {
        target_date,
        tenant_id: row.target_tenant_id.clone(),
        sample_size: row.sample_size,
        prompt_template_id: row.prompt_template_id,
    };

    let job_id = match jobs.create_job(request).await {
        Ok(id) => id,
        Err(e) => {
            error!(schedule_id = %schedule_id, "Scheduled job creation failed: {}", e);
            return;
        }
    };

    if let Err(e) = jobs.run_job(job_id).await {
        error!(schedule_id = %schedule_id, job_id = %job_id, "Scheduled run failed: {}", e);
    }
}

/// Six-field cron expression (with seconds) for the schedule's local fire
/// time. An empty day list means every day.
fn cron_expression(hour: i32, minute: i32, days_of_week: &[u8]) -> String {
    let days = if days_of_week.is_empty() {
        "*".to_string()
    } else {
        days_of_week
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(",")
    };

    format!("0 {} {} * * {}", minute, hour, days)
}

/// Weekday numbers from the JSONB column, dropping anything outside 0..=6.
fn days_from_json(value: &serde_json::Value) -> Vec<u8> {
    value
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_u64())
                .filter(|&d| d <= 6)
                .map(|d| d as u8)
                .collect()
        })
        .unwrap_or_default()
}
