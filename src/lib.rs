//! Conversation quality analysis server library.
//!
//! Provides the job engine, schedule registry, and HTTP API for batch
//! analysis of sampled user/assistant conversations.

pub mod api;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod services;
