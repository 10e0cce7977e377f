//! Database module providing connection management and per-entity queries.

pub mod analysis_jobs;
pub mod analysis_results;
pub mod analysis_schedules;
pub mod prompt_templates;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Database connection pool wrapper around the SeaORM connection.
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Connect to PostgreSQL using the configured URL.
    pub async fn connect(config: &Config) -> AppResult<Self> {
        let mut options = ConnectOptions::new(config.database_url.clone());
        options
            .max_connections(20)
            .min_connections(2)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        let conn = Database::connect(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to database: {}", e)))?;

        Ok(DbPool { conn })
    }

    /// Wrap an existing connection (used by tests with the mock backend).
    pub fn from_connection(conn: DatabaseConnection) -> Self {
        DbPool { conn }
    }

    /// Get access to the connection for executing queries.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }
}
