//! Conversation sample models returned by the warehouse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One (user query, model reply) pair retrieved for analysis.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConversationSample {
    /// Timestamp of the original conversation turn.
    pub timestamp: DateTime<Utc>,
    pub tenant_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub user_query: String,
    pub model_reply: String,
}

/// A tenant with recorded activity on a given day.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TenantActivity {
    pub tenant_id: String,
    /// Number of recorded conversation turns on the day.
    pub activity_count: i64,
}
