use serde::{Deserialize, Serialize};

use super::checkin::CheckIn;

/// Scope filters for the statistics aggregation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsScope {
    pub team_id: Option<String>,
    pub user_id: Option<String>,
    /// Look-back window in days; None means all time.
    pub days: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckInStatistics {
    pub total: i64,
    pub pending: i64,
    pub responded: i64,
    pub skipped: i64,
    pub expired: i64,
    pub escalated: i64,
    /// `100 * responded / total`, 0 when total is 0.
    pub response_rate: f64,
    /// Mean minutes between schedule and response, over rows with both
    /// timestamps. None when no such rows exist.
    pub avg_response_time_minutes: Option<f64>,
    pub friction_count: i64,
}

/// Filters for the manager feed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedFilter {
    pub manager_id: Option<String>,
    pub needs_attention: Option<bool>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

/// One feed entry: a check-in annotated with attention routing.
#[derive(Debug, Clone, Serialize)]
pub struct FeedEntry {
    #[serde(flatten)]
    pub checkin: CheckIn,
    pub user_name: String,
    pub task_title: String,
    pub needs_attention: bool,
    pub attention_reason: Option<String>,
}
