use serde::{Deserialize, Serialize};

/// Grace window between `scheduled_at` and `expires_at` when the policy row
/// does not override it.
pub const DEFAULT_GRACE_HOURS: i64 = 4;

/// One check-in policy record, scoped to org default / team / user / task.
/// The most specific matching row wins wholesale; there is no field-level
/// merging across scopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInConfig {
    pub id: String,
    pub org_id: String,
    pub team_id: Option<String>,
    pub user_id: Option<String>,
    pub task_id: Option<String>,
    pub enabled: bool,
    pub interval_hours: i64,
    /// Sentiment below this marks the response as friction ("silent mode").
    pub friction_threshold: f64,
    pub max_daily_checkins: i64,
    pub work_start_hour: u32,
    pub work_end_hour: u32,
    /// Interpret the work-hours window in the subject's local zone.
    pub respect_timezone: bool,
    /// Weekday numbers, 0 = Monday .. 6 = Sunday.
    pub excluded_weekdays: Vec<u8>,
    pub auto_escalate_after_missed: i64,
    pub escalate_to_manager: bool,
    pub ai_suggestions_enabled: bool,
    pub sentiment_analysis_enabled: bool,
    pub grace_hours: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl CheckInConfig {
    pub fn grace_hours_or_default(&self) -> i64 {
        self.grace_hours.unwrap_or(DEFAULT_GRACE_HOURS)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateConfigInput {
    pub org_id: String,
    pub team_id: Option<String>,
    pub user_id: Option<String>,
    pub task_id: Option<String>,
    pub enabled: Option<bool>,
    pub interval_hours: Option<i64>,
    pub friction_threshold: Option<f64>,
    pub max_daily_checkins: Option<i64>,
    pub work_start_hour: Option<u32>,
    pub work_end_hour: Option<u32>,
    pub respect_timezone: Option<bool>,
    pub excluded_weekdays: Option<Vec<u8>>,
    pub auto_escalate_after_missed: Option<i64>,
    pub escalate_to_manager: Option<bool>,
    pub ai_suggestions_enabled: Option<bool>,
    pub sentiment_analysis_enabled: Option<bool>,
    pub grace_hours: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateConfigInput {
    pub enabled: Option<bool>,
    pub interval_hours: Option<i64>,
    pub friction_threshold: Option<f64>,
    pub max_daily_checkins: Option<i64>,
    pub work_start_hour: Option<u32>,
    pub work_end_hour: Option<u32>,
    pub respect_timezone: Option<bool>,
    pub excluded_weekdays: Option<Vec<u8>>,
    pub auto_escalate_after_missed: Option<i64>,
    pub escalate_to_manager: Option<bool>,
    pub ai_suggestions_enabled: Option<bool>,
    pub sentiment_analysis_enabled: Option<bool>,
    /// `Some(None)` clears the override back to the system default.
    pub grace_hours: Option<Option<i64>>,
}
