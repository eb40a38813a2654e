use rusqlite::Connection;

use crate::error::AppError;

/// Run the consolidated schema migration. Idempotent: every statement is
/// guarded with IF NOT EXISTS.
pub fn run(conn: &Connection) -> Result<(), AppError> {
    tracing::debug!("Running database migrations");

    conn.execute_batch(SCHEMA)?;

    tracing::info!("Database migrations complete");
    Ok(())
}

const SCHEMA: &str = r#"

-- ============================================================================
-- Users (mirror of the external user system; read-mostly here)
-- ============================================================================

CREATE TABLE IF NOT EXISTS users (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    team_id     TEXT,
    manager_id  TEXT REFERENCES users(id) ON DELETE SET NULL,
    timezone    TEXT NOT NULL DEFAULT 'UTC',
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_users_team    ON users(team_id);
CREATE INDEX IF NOT EXISTS idx_users_manager ON users(manager_id);

-- ============================================================================
-- Tasks (mirror of the external task system)
-- ============================================================================

CREATE TABLE IF NOT EXISTS tasks (
    id           TEXT PRIMARY KEY,
    title        TEXT NOT NULL,
    team_id      TEXT,
    assignee_id  TEXT REFERENCES users(id) ON DELETE SET NULL,
    status       TEXT NOT NULL DEFAULT 'active',
    activated_at TEXT,
    created_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_assignee ON tasks(assignee_id);
CREATE INDEX IF NOT EXISTS idx_tasks_status   ON tasks(status);

-- ============================================================================
-- Check-in policy records, one row per scope (org / team / user / task)
-- ============================================================================

CREATE TABLE IF NOT EXISTS checkin_configs (
    id                          TEXT PRIMARY KEY,
    org_id                      TEXT NOT NULL,
    team_id                     TEXT,
    user_id                     TEXT,
    task_id                     TEXT,
    enabled                     INTEGER NOT NULL DEFAULT 1,
    interval_hours              INTEGER NOT NULL DEFAULT 24 CHECK(interval_hours >= 1),
    friction_threshold          REAL    NOT NULL DEFAULT 0.3,
    max_daily_checkins          INTEGER NOT NULL DEFAULT 3 CHECK(max_daily_checkins >= 1),
    work_start_hour             INTEGER NOT NULL DEFAULT 9,
    work_end_hour               INTEGER NOT NULL DEFAULT 17,
    respect_timezone            INTEGER NOT NULL DEFAULT 1,
    excluded_weekdays           TEXT    NOT NULL DEFAULT '[5,6]',
    auto_escalate_after_missed  INTEGER NOT NULL DEFAULT 3,
    escalate_to_manager         INTEGER NOT NULL DEFAULT 1,
    ai_suggestions_enabled      INTEGER NOT NULL DEFAULT 1,
    sentiment_analysis_enabled  INTEGER NOT NULL DEFAULT 1,
    grace_hours                 INTEGER,
    created_at                  TEXT NOT NULL,
    updated_at                  TEXT NOT NULL,
    CHECK(work_start_hour >= 0 AND work_start_hour < work_end_hour AND work_end_hour <= 24)
);
CREATE INDEX IF NOT EXISTS idx_cfg_org  ON checkin_configs(org_id);
CREATE INDEX IF NOT EXISTS idx_cfg_team ON checkin_configs(team_id);
CREATE INDEX IF NOT EXISTS idx_cfg_user ON checkin_configs(user_id);
CREATE INDEX IF NOT EXISTS idx_cfg_task ON checkin_configs(task_id);
-- Exactly one org-wide default per org (all scope columns NULL).
CREATE UNIQUE INDEX IF NOT EXISTS idx_cfg_org_default ON checkin_configs(org_id)
    WHERE team_id IS NULL AND user_id IS NULL AND task_id IS NULL;

-- ============================================================================
-- Check-ins: one scheduled prompt instance per (task, user, cycle).
-- Rows are never deleted; they are the audit trail for statistics.
-- ============================================================================

CREATE TABLE IF NOT EXISTS checkins (
    id                          TEXT PRIMARY KEY,
    task_id                     TEXT NOT NULL REFERENCES tasks(id),
    user_id                     TEXT NOT NULL REFERENCES users(id),
    cycle_number                INTEGER NOT NULL CHECK(cycle_number >= 1),
    trigger_origin              TEXT NOT NULL DEFAULT 'scheduled'
                                CHECK(trigger_origin IN ('scheduled', 'manual', 'escalation', 'system')),
    status                      TEXT NOT NULL DEFAULT 'pending'
                                CHECK(status IN ('pending', 'responded', 'skipped', 'expired', 'escalated')),
    scheduled_at                TEXT NOT NULL,
    expires_at                  TEXT,
    responded_at                TEXT,
    progress_indicator          TEXT
                                CHECK(progress_indicator IS NULL OR
                                      progress_indicator IN ('on_track', 'at_risk', 'blocked', 'completed')),
    progress_notes              TEXT,
    completed_since_last        TEXT,
    blockers_reported           TEXT,
    help_needed                 TEXT,
    estimated_completion_change TEXT,
    skip_reason                 TEXT,
    ai_suggestion               TEXT,
    ai_confidence               REAL,
    sentiment_score             REAL CHECK(sentiment_score IS NULL OR
                                           (sentiment_score >= 0.0 AND sentiment_score <= 1.0)),
    friction_detected           INTEGER NOT NULL DEFAULT 0,
    escalated                   INTEGER NOT NULL DEFAULT 0,
    escalated_to                TEXT,
    escalated_at                TEXT,
    escalation_reason           TEXT,
    created_at                  TEXT NOT NULL,
    updated_at                  TEXT NOT NULL,
    UNIQUE(task_id, user_id, cycle_number),
    CHECK(expires_at IS NULL OR expires_at > scheduled_at)
);
CREATE INDEX IF NOT EXISTS idx_checkins_pair      ON checkins(task_id, user_id);
CREATE INDEX IF NOT EXISTS idx_checkins_status    ON checkins(status);
CREATE INDEX IF NOT EXISTS idx_checkins_scheduled ON checkins(scheduled_at);
CREATE INDEX IF NOT EXISTS idx_checkins_user      ON checkins(user_id);
-- At most one pending check-in per (task, user) pair, enforced by the engine
-- and backstopped here.
CREATE UNIQUE INDEX IF NOT EXISTS idx_checkins_single_pending ON checkins(task_id, user_id)
    WHERE status = 'pending';

"#;
