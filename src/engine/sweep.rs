use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::models::{CheckInStatus, TriggerOrigin};
use crate::db::repos::{checkins, configs, subjects};
use crate::engine::scheduler;
use crate::engine::CheckInEngine;
use crate::error::AppError;

/// Runtime state for the sweeps, shared across threads.
pub struct SweeperState {
    running: AtomicBool,
    sweeps_run: AtomicU64,
    checkins_scheduled: AtomicU64,
    checkins_expired: AtomicU64,
    escalations_triggered: AtomicU64,
}

impl Default for SweeperState {
    fn default() -> Self {
        Self::new()
    }
}

impl SweeperState {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            sweeps_run: AtomicU64::new(0),
            checkins_scheduled: AtomicU64::new(0),
            checkins_expired: AtomicU64::new(0),
            escalations_triggered: AtomicU64::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> SweeperStats {
        SweeperStats {
            running: self.running.load(Ordering::Relaxed),
            sweeps_run: self.sweeps_run.load(Ordering::Relaxed),
            checkins_scheduled: self.checkins_scheduled.load(Ordering::Relaxed),
            checkins_expired: self.checkins_expired.load(Ordering::Relaxed),
            escalations_triggered: self.escalations_triggered.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SweeperStats {
    pub running: bool,
    pub sweeps_run: u64,
    pub checkins_scheduled: u64,
    pub checkins_expired: u64,
    pub escalations_triggered: u64,
}

/// Start both background loops. Returns immediately.
pub fn start_loops(
    state: Arc<SweeperState>,
    engine: Arc<CheckInEngine>,
    schedule_interval: Duration,
    expiry_interval: Duration,
) {
    state.running.store(true, Ordering::Relaxed);
    tracing::info!(
        "Sweeps starting: schedule ({}s) + expiry ({}s)",
        schedule_interval.as_secs(),
        expiry_interval.as_secs()
    );

    tokio::spawn({
        let state = state.clone();
        let engine = engine.clone();
        async move {
            schedule_loop(state, engine, schedule_interval).await;
        }
    });

    tokio::spawn({
        let state = state.clone();
        async move {
            expiry_loop(state, engine, expiry_interval).await;
        }
    });
}

/// Stop both background loops.
pub fn stop_loops(state: &SweeperState) {
    state.running.store(false, Ordering::Relaxed);
    tracing::info!("Sweeps stopped");
}

async fn schedule_loop(state: Arc<SweeperState>, engine: Arc<CheckInEngine>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        if !state.is_running() {
            break;
        }
        if let Err(e) = run_schedule_sweep(&state, &engine, Utc::now()).await {
            tracing::error!("Schedule sweep error: {e}");
        }
        state.sweeps_run.fetch_add(1, Ordering::Relaxed);
    }
    tracing::info!("Schedule loop exited");
}

async fn expiry_loop(state: Arc<SweeperState>, engine: Arc<CheckInEngine>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        if !state.is_running() {
            break;
        }
        if let Err(e) = run_expiry_sweep(&state, &engine, Utc::now()).await {
            tracing::error!("Expiry sweep error: {e}");
        }
    }
    tracing::info!("Expiry loop exited");
}

fn parse_ts(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// One pass over active assignments: compute each pair's next slot and
/// create its check-in when the slot is due. Per-pair failures are logged
/// and skipped so one bad assignment cannot stall the sweep.
pub async fn run_schedule_sweep(
    state: &SweeperState,
    engine: &CheckInEngine,
    now: DateTime<Utc>,
) -> Result<u64, AppError> {
    let pool = engine.pool();
    let assignments = subjects::active_assignments(pool)?;
    let mut created = 0u64;

    for assignment in assignments {
        let cfg = match configs::resolve_effective(
            pool,
            engine.org_id(),
            assignment.team_id.as_deref(),
            Some(&assignment.user_id),
            Some(&assignment.task_id),
        ) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::error!(
                    task_id = %assignment.task_id,
                    user_id = %assignment.user_id,
                    "Config resolution failed: {e}"
                );
                continue;
            }
        };
        if !cfg.enabled {
            continue;
        }

        // An open prompt blocks the next one.
        if checkins::get_pending_for(pool, &assignment.task_id, &assignment.user_id)?.is_some() {
            continue;
        }

        let tz = scheduler::effective_zone(&cfg, &assignment.timezone);
        let last = checkins::latest_cycle(pool, &assignment.task_id, &assignment.user_id)?
            .and_then(|c| parse_ts(&c.scheduled_at));
        let activated = assignment
            .activated_at
            .as_deref()
            .and_then(parse_ts)
            .unwrap_or(now);

        let mut slot = scheduler::compute_next(&cfg, last, activated, tz);
        if slot > now {
            continue;
        }

        // Daily cap: step to the next working day's opening until a local day
        // with room is found. A deferred day may already be full too, e.g.
        // from manual check-ins.
        loop {
            let (day_start, day_end) = scheduler::cap_window(slot, tz);
            let count = checkins::count_scheduled_between(
                pool,
                &assignment.task_id,
                &assignment.user_id,
                &day_start,
                &day_end,
            )?;
            if count < cfg.max_daily_checkins {
                break;
            }
            slot = scheduler::next_day_opening(&cfg, slot, tz);
            if slot > now {
                break;
            }
        }
        if slot > now {
            continue;
        }

        let expires = scheduler::expiry_for(&cfg, slot).to_rfc3339();
        match checkins::create(
            pool,
            &assignment.task_id,
            &assignment.user_id,
            TriggerOrigin::Scheduled,
            &slot.to_rfc3339(),
            Some(&expires),
        ) {
            Ok(checkin) => {
                engine.notifier().checkin_created(&checkin).await;
                state.checkins_scheduled.fetch_add(1, Ordering::Relaxed);
                created += 1;
            }
            Err(AppError::Conflict(msg)) => {
                tracing::debug!(
                    task_id = %assignment.task_id,
                    user_id = %assignment.user_id,
                    "Schedule sweep lost a race: {msg}"
                );
            }
            Err(e) => {
                tracing::error!(
                    task_id = %assignment.task_id,
                    user_id = %assignment.user_id,
                    "Failed to create scheduled check-in: {e}"
                );
            }
        }
    }
    Ok(created)
}

/// One pass over overdue pending rows: expire each through the engine so the
/// missed-streak pass runs. A row resolved concurrently loses quietly.
pub async fn run_expiry_sweep(
    state: &SweeperState,
    engine: &CheckInEngine,
    now: DateTime<Utc>,
) -> Result<u64, AppError> {
    let due = checkins::due_expirations(engine.pool(), &now.to_rfc3339(), 100)?;
    let mut expired = 0u64;

    for row in due {
        match engine.expire(&row.id, now).await {
            Ok(after) => {
                state.checkins_expired.fetch_add(1, Ordering::Relaxed);
                expired += 1;
                if after.status == CheckInStatus::Escalated {
                    state.escalations_triggered.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(AppError::Conflict(_)) | Err(AppError::NotFound(_)) => {
                tracing::debug!(checkin_id = %row.id, "Expiry sweep lost a race");
            }
            Err(e) => {
                tracing::error!(checkin_id = %row.id, "Expiry failed: {e}");
            }
        }
    }
    Ok(expired)
}
