use std::sync::Arc;

use crate::db::models::{CheckIn, CheckInConfig};
use crate::db::repos::{checkins, subjects};
use crate::db::DbPool;
use crate::engine::notify::Notifier;
use crate::error::AppError;

/// Escalation target for a pair: the explicit override, or the subject's
/// manager when the policy routes to managers.
pub fn resolve_target(
    pool: &DbPool,
    cfg: &CheckInConfig,
    user_id: &str,
    explicit: Option<&str>,
) -> Result<Option<String>, AppError> {
    if let Some(target) = explicit {
        return Ok(Some(target.to_string()));
    }
    if cfg.escalate_to_manager {
        return subjects::manager_of(pool, user_id);
    }
    Ok(None)
}

/// Shared CAS escalate + notify. An already-escalated row is a detected
/// no-op; the conflict is logged at debug and not propagated.
async fn escalate_row(
    pool: &DbPool,
    notifier: &Arc<dyn Notifier>,
    checkin_id: &str,
    target: Option<&str>,
    reason: &str,
    now: &str,
) -> Result<Option<CheckIn>, AppError> {
    match checkins::mark_escalated(pool, checkin_id, reason, target, now) {
        Ok(escalated) => {
            notifier.escalation_raised(&escalated, target, reason).await;
            Ok(Some(escalated))
        }
        Err(AppError::Conflict(msg)) => {
            tracing::debug!(checkin_id, "Escalation skipped: {msg}");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Missed-cadence path: runs after every skip or expire. When the streak of
/// consecutive non-responded cycles reaches the policy threshold, the latest
/// cycle for the pair is escalated.
pub async fn check_missed_streak(
    pool: &DbPool,
    notifier: &Arc<dyn Notifier>,
    cfg: &CheckInConfig,
    task_id: &str,
    user_id: &str,
    now: &str,
) -> Result<Option<CheckIn>, AppError> {
    if cfg.auto_escalate_after_missed < 1 {
        return Ok(None);
    }
    let streak = checkins::missed_streak(pool, task_id, user_id)?;
    if streak < cfg.auto_escalate_after_missed {
        return Ok(None);
    }

    let latest = match checkins::latest_cycle(pool, task_id, user_id)? {
        Some(c) => c,
        None => return Ok(None),
    };

    let target = resolve_target(pool, cfg, user_id, None)?;
    if target.is_none() {
        tracing::warn!(
            task_id,
            user_id,
            streak,
            "Missed-streak threshold reached but no escalation target resolvable"
        );
        return Ok(None);
    }

    let reason = format!("auto: {streak} consecutive missed check-ins");
    escalate_row(pool, notifier, &latest.id, target.as_deref(), &reason, now).await
}

/// Friction path ("silent mode"): a response flagged with friction escalates
/// immediately when the policy routes to managers.
pub async fn friction_escalate(
    pool: &DbPool,
    notifier: &Arc<dyn Notifier>,
    cfg: &CheckInConfig,
    checkin: &CheckIn,
    now: &str,
) -> Result<Option<CheckIn>, AppError> {
    if !cfg.escalate_to_manager {
        return Ok(None);
    }
    let target = resolve_target(pool, cfg, &checkin.user_id, None)?;
    if target.is_none() {
        tracing::warn!(
            checkin_id = %checkin.id,
            user_id = %checkin.user_id,
            "Friction detected but no escalation target resolvable"
        );
        return Ok(None);
    }
    escalate_row(
        pool,
        notifier,
        &checkin.id,
        target.as_deref(),
        "friction detected in response",
        now,
    )
    .await
}
