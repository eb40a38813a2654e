use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ============================================================================
// Status / trigger / indicator vocabularies
// ============================================================================

/// Lifecycle status of a check-in. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInStatus {
    Pending,
    Responded,
    Skipped,
    Expired,
    Escalated,
}

impl CheckInStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Responded => "responded",
            Self::Skipped => "skipped",
            Self::Expired => "expired",
            Self::Escalated => "escalated",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "pending" => Ok(Self::Pending),
            "responded" => Ok(Self::Responded),
            "skipped" => Ok(Self::Skipped),
            "expired" => Ok(Self::Expired),
            "escalated" => Ok(Self::Escalated),
            other => Err(AppError::Validation(format!(
                "Invalid status '{other}'. Must be one of: pending, responded, skipped, expired, escalated"
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for CheckInStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What caused a check-in instance to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOrigin {
    Scheduled,
    Manual,
    Escalation,
    System,
}

impl TriggerOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
            Self::Escalation => "escalation",
            Self::System => "system",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "manual" => Ok(Self::Manual),
            "escalation" => Ok(Self::Escalation),
            "system" => Ok(Self::System),
            other => Err(AppError::Validation(format!(
                "Invalid trigger '{other}'. Must be one of: scheduled, manual, escalation, system"
            ))),
        }
    }
}

impl std::fmt::Display for TriggerOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed vocabulary for the required progress field of a response.
pub const PROGRESS_INDICATORS: &[&str] = &["on_track", "at_risk", "blocked", "completed"];

// ============================================================================
// Rows and inputs
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckIn {
    pub id: String,
    pub task_id: String,
    pub user_id: String,
    pub cycle_number: i64,
    #[serde(rename = "trigger")]
    pub trigger_origin: TriggerOrigin,
    pub status: CheckInStatus,
    pub scheduled_at: String,
    pub expires_at: Option<String>,
    pub responded_at: Option<String>,
    pub progress_indicator: Option<String>,
    pub progress_notes: Option<String>,
    pub completed_since_last: Option<String>,
    pub blockers_reported: Option<String>,
    pub help_needed: Option<String>,
    pub estimated_completion_change: Option<String>,
    pub skip_reason: Option<String>,
    pub ai_suggestion: Option<String>,
    pub ai_confidence: Option<f64>,
    pub sentiment_score: Option<f64>,
    pub friction_detected: bool,
    pub escalated: bool,
    pub escalated_to: Option<String>,
    pub escalated_at: Option<String>,
    pub escalation_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCheckInInput {
    pub task_id: String,
    /// Defaults to the task's current assignee.
    pub user_id: Option<String>,
    #[serde(rename = "trigger")]
    pub trigger_origin: Option<TriggerOrigin>,
    /// Override for the prompt time; defaults to now.
    pub scheduled_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RespondInput {
    pub progress_indicator: String,
    pub progress_notes: Option<String>,
    pub completed_since_last: Option<String>,
    pub blockers_reported: Option<String>,
    pub help_needed: Option<String>,
    pub estimated_completion_change: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SkipInput {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EscalateInput {
    pub reason: String,
    pub escalate_to: Option<String>,
}

/// Filters for the paginated list endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckInFilter {
    pub status: Option<String>,
    pub task_id: Option<String>,
    pub user_id: Option<String>,
    pub team_id: Option<String>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}
