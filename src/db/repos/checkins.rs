use rusqlite::{params, Row};

use crate::db::models::{CheckIn, CheckInFilter, CheckInStatus, RespondInput, TriggerOrigin};
use crate::db::DbPool;
use crate::error::AppError;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

pub(crate) fn row_to_checkin(row: &Row) -> rusqlite::Result<CheckIn> {
    let status: String = row.get("status")?;
    let trigger: String = row.get("trigger_origin")?;
    Ok(CheckIn {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        user_id: row.get("user_id")?,
        cycle_number: row.get("cycle_number")?,
        trigger_origin: TriggerOrigin::parse(&trigger)
            .map_err(|_| rusqlite::Error::InvalidQuery)?,
        status: CheckInStatus::parse(&status).map_err(|_| rusqlite::Error::InvalidQuery)?,
        scheduled_at: row.get("scheduled_at")?,
        expires_at: row.get("expires_at")?,
        responded_at: row.get("responded_at")?,
        progress_indicator: row.get("progress_indicator")?,
        progress_notes: row.get("progress_notes")?,
        completed_since_last: row.get("completed_since_last")?,
        blockers_reported: row.get("blockers_reported")?,
        help_needed: row.get("help_needed")?,
        estimated_completion_change: row.get("estimated_completion_change")?,
        skip_reason: row.get("skip_reason")?,
        ai_suggestion: row.get("ai_suggestion")?,
        ai_confidence: row.get("ai_confidence")?,
        sentiment_score: row.get("sentiment_score")?,
        friction_detected: row.get::<_, i32>("friction_detected")? != 0,
        escalated: row.get::<_, i32>("escalated")? != 0,
        escalated_to: row.get("escalated_to")?,
        escalated_at: row.get("escalated_at")?,
        escalation_reason: row.get("escalation_reason")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn get_by_id(pool: &DbPool, id: &str) -> Result<CheckIn, AppError> {
    let conn = pool.get()?;
    conn.query_row(
        "SELECT * FROM checkins WHERE id = ?1",
        params![id],
        row_to_checkin,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => AppError::NotFound(format!("Check-in {id}")),
        other => AppError::Database(other),
    })
}

/// Create the next check-in for a (task, user) pair. The cycle number is
/// allocated inside the insert; the single-pending invariant is checked here
/// and backstopped by the partial unique index.
pub fn create(
    pool: &DbPool,
    task_id: &str,
    user_id: &str,
    trigger: TriggerOrigin,
    scheduled_at: &str,
    expires_at: Option<&str>,
) -> Result<CheckIn, AppError> {
    if let Some(exp) = expires_at {
        if exp <= scheduled_at {
            return Err(AppError::Validation(
                "expires_at must be after scheduled_at".into(),
            ));
        }
    }

    if get_pending_for(pool, task_id, user_id)?.is_some() {
        return Err(AppError::Conflict(format!(
            "A pending check-in already exists for task {task_id} / user {user_id}"
        )));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO checkins
         (id, task_id, user_id, cycle_number, trigger_origin, status, scheduled_at, expires_at,
          created_at, updated_at)
         VALUES (?1, ?2, ?3,
                 (SELECT COALESCE(MAX(cycle_number), 0) + 1 FROM checkins
                  WHERE task_id = ?2 AND user_id = ?3),
                 ?4, 'pending', ?5, ?6, ?7, ?7)",
        params![id, task_id, user_id, trigger.as_str(), scheduled_at, expires_at, now],
    )
    .map_err(|e| match e {
        // Partial unique index hit: another pending row raced us in.
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AppError::Conflict(format!(
                "A pending check-in already exists for task {task_id} / user {user_id}"
            ))
        }
        other => AppError::Database(other),
    })?;

    get_by_id(pool, &id)
}

pub fn list(pool: &DbPool, filter: &CheckInFilter) -> Result<Vec<CheckIn>, AppError> {
    let mut sql = String::from("SELECT c.* FROM checkins c WHERE 1=1");
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut idx = 1u32;

    if let Some(ref status) = filter.status {
        CheckInStatus::parse(status)?;
        sql.push_str(&format!(" AND c.status = ?{idx}"));
        param_values.push(Box::new(status.clone()));
        idx += 1;
    }
    if let Some(ref task_id) = filter.task_id {
        sql.push_str(&format!(" AND c.task_id = ?{idx}"));
        param_values.push(Box::new(task_id.clone()));
        idx += 1;
    }
    if let Some(ref user_id) = filter.user_id {
        sql.push_str(&format!(" AND c.user_id = ?{idx}"));
        param_values.push(Box::new(user_id.clone()));
        idx += 1;
    }
    if let Some(ref team_id) = filter.team_id {
        sql.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM tasks t WHERE t.id = c.task_id AND t.team_id = ?{idx})"
        ));
        param_values.push(Box::new(team_id.clone()));
        idx += 1;
    }

    let limit = filter
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let skip = filter.skip.unwrap_or(0).max(0);
    sql.push_str(&format!(
        " ORDER BY c.scheduled_at DESC LIMIT ?{idx} OFFSET ?{}",
        idx + 1
    ));
    param_values.push(Box::new(limit));
    param_values.push(Box::new(skip));

    let conn = pool.get()?;
    let mut stmt = conn.prepare(&sql)?;
    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_ref.as_slice(), row_to_checkin)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}

/// The outstanding pending check-in for one pair, if any.
pub fn get_pending_for(
    pool: &DbPool,
    task_id: &str,
    user_id: &str,
) -> Result<Option<CheckIn>, AppError> {
    let conn = pool.get()?;
    match conn.query_row(
        "SELECT * FROM checkins WHERE task_id = ?1 AND user_id = ?2 AND status = 'pending'",
        params![task_id, user_id],
        row_to_checkin,
    ) {
        Ok(c) => Ok(Some(c)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(AppError::Database(e)),
    }
}

/// The most recent cycle for a pair regardless of status.
pub fn latest_cycle(
    pool: &DbPool,
    task_id: &str,
    user_id: &str,
) -> Result<Option<CheckIn>, AppError> {
    let conn = pool.get()?;
    match conn.query_row(
        "SELECT * FROM checkins WHERE task_id = ?1 AND user_id = ?2
         ORDER BY cycle_number DESC LIMIT 1",
        params![task_id, user_id],
        row_to_checkin,
    ) {
        Ok(c) => Ok(Some(c)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(AppError::Database(e)),
    }
}

/// Number of check-ins scheduled for this pair inside [start, end), the
/// daily-cap window computed by the scheduler in the subject's zone.
pub fn count_scheduled_between(
    pool: &DbPool,
    task_id: &str,
    user_id: &str,
    start: &str,
    end: &str,
) -> Result<i64, AppError> {
    let conn = pool.get()?;
    let count = conn.query_row(
        "SELECT COUNT(*) FROM checkins
         WHERE task_id = ?1 AND user_id = ?2 AND scheduled_at >= ?3 AND scheduled_at < ?4",
        params![task_id, user_id, start, end],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Pending check-ins whose expiry has passed. The expiry sweep CASes each of
/// these individually; a row resolved between select and update simply loses
/// the race.
pub fn due_expirations(pool: &DbPool, now: &str, limit: i64) -> Result<Vec<CheckIn>, AppError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT * FROM checkins
         WHERE status = 'pending' AND expires_at IS NOT NULL AND expires_at <= ?1
         ORDER BY expires_at ASC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![now, limit], row_to_checkin)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}

/// Consecutive non-responded cycles, walking backward from the most recent
/// resolved cycle until a responded cycle or the series start. A still-open
/// pending cycle at the head does not break the streak.
pub fn missed_streak(pool: &DbPool, task_id: &str, user_id: &str) -> Result<i64, AppError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT status FROM checkins WHERE task_id = ?1 AND user_id = ?2
         ORDER BY cycle_number DESC",
    )?;
    let statuses = stmt
        .query_map(params![task_id, user_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut streak = 0i64;
    for status in statuses {
        match status.as_str() {
            "pending" => continue,
            "responded" => break,
            _ => streak += 1,
        }
    }
    Ok(streak)
}

// ============================================================================
// Transitions: atomic conditional updates keyed on current status
// ============================================================================

/// Discriminate a zero-row CAS miss into NotFound (row absent) or Conflict
/// (row present but no longer in an eligible source state).
fn cas_miss(pool: &DbPool, id: &str, attempted: &str) -> AppError {
    match get_by_id(pool, id) {
        Ok(current) => AppError::Conflict(format!(
            "Cannot {attempted} check-in {id}: status is already '{}'",
            current.status
        )),
        Err(e) => e,
    }
}

pub fn mark_responded(
    pool: &DbPool,
    id: &str,
    input: &RespondInput,
    friction: bool,
    now: &str,
) -> Result<CheckIn, AppError> {
    let conn = pool.get()?;
    let rows = conn.execute(
        "UPDATE checkins SET
           status = 'responded',
           responded_at = ?1,
           progress_indicator = ?2,
           progress_notes = ?3,
           completed_since_last = ?4,
           blockers_reported = ?5,
           help_needed = ?6,
           estimated_completion_change = ?7,
           friction_detected = ?8,
           updated_at = ?1
         WHERE id = ?9 AND status = 'pending'",
        params![
            now,
            input.progress_indicator,
            input.progress_notes,
            input.completed_since_last,
            input.blockers_reported,
            input.help_needed,
            input.estimated_completion_change,
            friction as i32,
            id
        ],
    )?;
    drop(conn);
    if rows == 0 {
        return Err(cas_miss(pool, id, "respond to"));
    }
    get_by_id(pool, id)
}

pub fn mark_skipped(
    pool: &DbPool,
    id: &str,
    reason: Option<&str>,
    now: &str,
) -> Result<CheckIn, AppError> {
    let conn = pool.get()?;
    let rows = conn.execute(
        "UPDATE checkins SET
           status = 'skipped', responded_at = ?1, skip_reason = ?2, updated_at = ?1
         WHERE id = ?3 AND status = 'pending'",
        params![now, reason, id],
    )?;
    drop(conn);
    if rows == 0 {
        return Err(cas_miss(pool, id, "skip"));
    }
    get_by_id(pool, id)
}

pub fn mark_expired(pool: &DbPool, id: &str, now: &str) -> Result<CheckIn, AppError> {
    let conn = pool.get()?;
    let rows = conn.execute(
        "UPDATE checkins SET status = 'expired', updated_at = ?1
         WHERE id = ?2 AND status = 'pending'",
        params![now, id],
    )?;
    drop(conn);
    if rows == 0 {
        return Err(cas_miss(pool, id, "expire"));
    }
    get_by_id(pool, id)
}

/// Escalation is terminal. Eligible sources are pending/skipped/expired, plus
/// responded rows already flagged as friction (the silent-mode path).
pub fn mark_escalated(
    pool: &DbPool,
    id: &str,
    reason: &str,
    escalated_to: Option<&str>,
    now: &str,
) -> Result<CheckIn, AppError> {
    let conn = pool.get()?;
    let rows = conn.execute(
        "UPDATE checkins SET
           status = 'escalated',
           escalated = 1,
           escalated_at = ?1,
           escalation_reason = ?2,
           escalated_to = ?3,
           updated_at = ?1
         WHERE id = ?4 AND (status IN ('pending', 'skipped', 'expired')
                            OR (status = 'responded' AND friction_detected = 1))",
        params![now, reason, escalated_to, id],
    )?;
    drop(conn);
    if rows == 0 {
        return Err(cas_miss(pool, id, "escalate"));
    }
    get_by_id(pool, id)
}

/// Apply enrichment output to a responded check-in. Friction is upgraded in
/// the same statement when the sentiment falls below the threshold; the row
/// is left alone if the response has moved on (e.g. already escalated).
/// Returns the refreshed row, or None when the CAS missed.
pub fn apply_enrichment(
    pool: &DbPool,
    id: &str,
    suggestion: Option<&str>,
    confidence: Option<f64>,
    sentiment: Option<f64>,
    friction_threshold: f64,
) -> Result<Option<CheckIn>, AppError> {
    let now = chrono::Utc::now().to_rfc3339();
    let conn = pool.get()?;
    let rows = conn.execute(
        "UPDATE checkins SET
           ai_suggestion = COALESCE(?1, ai_suggestion),
           ai_confidence = COALESCE(?2, ai_confidence),
           sentiment_score = COALESCE(?3, sentiment_score),
           friction_detected = CASE
             WHEN ?3 IS NOT NULL AND ?3 < ?4 THEN 1
             ELSE friction_detected
           END,
           updated_at = ?5
         WHERE id = ?6 AND status = 'responded'",
        params![suggestion, confidence, sentiment, friction_threshold, now, id],
    )?;
    drop(conn);
    if rows == 0 {
        return Ok(None);
    }
    get_by_id(pool, id).map(Some)
}
