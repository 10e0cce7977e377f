//! SeaORM entity definitions for PostgreSQL database.

pub mod analysis_job;
pub mod analysis_result;
pub mod analysis_schedule;
pub mod prompt_template;
