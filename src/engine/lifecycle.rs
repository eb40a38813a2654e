use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::db::models::{
    CheckIn, CheckInConfig, CreateCheckInInput, EscalateInput, RespondInput, SkipInput,
    TriggerOrigin, PROGRESS_INDICATORS,
};
use crate::db::repos::{checkins, configs, subjects};
use crate::db::DbPool;
use crate::engine::enrichment::EnrichmentProvider;
use crate::engine::notify::Notifier;
use crate::engine::{escalation, scheduler};
use crate::error::AppError;
use crate::validation;

/// Orchestrates check-in transitions: config resolution, the CAS updates in
/// the repo layer, the synchronous escalation pass, and the off-path
/// enrichment task.
pub struct CheckInEngine {
    pool: DbPool,
    org_id: String,
    enrichment: Arc<dyn EnrichmentProvider>,
    notifier: Arc<dyn Notifier>,
    enrichment_timeout: Duration,
}

impl CheckInEngine {
    pub fn new(
        pool: DbPool,
        org_id: String,
        enrichment: Arc<dyn EnrichmentProvider>,
        notifier: Arc<dyn Notifier>,
        enrichment_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            org_id,
            enrichment,
            notifier,
            enrichment_timeout,
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn org_id(&self) -> &str {
        &self.org_id
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Effective config for a pair: the subject's team scopes the lookup.
    pub fn config_for(&self, task_id: &str, user_id: &str) -> Result<CheckInConfig, AppError> {
        let user = subjects::get_user(&self.pool, user_id)?;
        configs::resolve_effective(
            &self.pool,
            &self.org_id,
            user.team_id.as_deref(),
            Some(user_id),
            Some(task_id),
        )
    }

    /// Manual or system creation through the API. The assignee defaults to
    /// the task's current one; the slot defaults to now with the policy's
    /// grace period as expiry.
    pub async fn create(
        &self,
        input: &CreateCheckInInput,
        now: DateTime<Utc>,
    ) -> Result<CheckIn, AppError> {
        validation::require_valid_id("task_id", &input.task_id)?;
        let task = subjects::get_task(&self.pool, &input.task_id)?;
        let user_id = match input.user_id.as_deref() {
            Some(u) => {
                validation::require_valid_id("user_id", u)?;
                u.to_string()
            }
            None => task.assignee_id.clone().ok_or_else(|| {
                AppError::Validation(format!("Task {} has no assignee", task.id))
            })?,
        };
        subjects::get_user(&self.pool, &user_id)?;

        let trigger = input.trigger_origin.unwrap_or(TriggerOrigin::Manual);
        let cfg = self.config_for(&task.id, &user_id)?;

        let scheduled_at = match input.scheduled_at.as_deref() {
            Some(s) => {
                let parsed: DateTime<Utc> = s
                    .parse()
                    .map_err(|_| AppError::Validation(format!("Invalid scheduled_at: {s}")))?;
                parsed
            }
            None => now,
        };
        let expires_at = scheduler::expiry_for(&cfg, scheduled_at).to_rfc3339();

        let created = checkins::create(
            &self.pool,
            &task.id,
            &user_id,
            trigger,
            &scheduled_at.to_rfc3339(),
            Some(&expires_at),
        )?;
        self.notifier.checkin_created(&created).await;
        Ok(created)
    }

    /// Respond transition plus the friction escalation pass and the spawned
    /// enrichment task. Returns the row as stored before enrichment lands.
    pub async fn respond(
        &self,
        id: &str,
        input: &RespondInput,
        now: DateTime<Utc>,
    ) -> Result<CheckIn, AppError> {
        validation::require_one_of("progress_indicator", &input.progress_indicator, PROGRESS_INDICATORS)?;

        let friction = input
            .blockers_reported
            .as_deref()
            .map(|b| !b.trim().is_empty())
            .unwrap_or(false);

        let now_str = now.to_rfc3339();
        let responded = checkins::mark_responded(&self.pool, id, input, friction, &now_str)?;
        let cfg = self.config_for(&responded.task_id, &responded.user_id)?;

        if friction {
            escalation::friction_escalate(&self.pool, &self.notifier, &cfg, &responded, &now_str)
                .await?;
        }

        if cfg.ai_suggestions_enabled || cfg.sentiment_analysis_enabled {
            tokio::spawn(run_enrichment(
                self.pool.clone(),
                self.enrichment.clone(),
                self.notifier.clone(),
                cfg,
                responded.clone(),
                self.enrichment_timeout,
            ));
        }

        checkins::get_by_id(&self.pool, id)
    }

    /// Skip transition plus the missed-streak pass.
    pub async fn skip(
        &self,
        id: &str,
        input: &SkipInput,
        now: DateTime<Utc>,
    ) -> Result<CheckIn, AppError> {
        let now_str = now.to_rfc3339();
        let skipped = checkins::mark_skipped(&self.pool, id, input.reason.as_deref(), &now_str)?;
        let cfg = self.config_for(&skipped.task_id, &skipped.user_id)?;
        escalation::check_missed_streak(
            &self.pool,
            &self.notifier,
            &cfg,
            &skipped.task_id,
            &skipped.user_id,
            &now_str,
        )
        .await?;
        checkins::get_by_id(&self.pool, id)
    }

    /// Expire transition plus the missed-streak pass. System-only; called
    /// from the expiry sweep.
    pub async fn expire(&self, id: &str, now: DateTime<Utc>) -> Result<CheckIn, AppError> {
        let now_str = now.to_rfc3339();
        let expired = checkins::mark_expired(&self.pool, id, &now_str)?;
        let cfg = self.config_for(&expired.task_id, &expired.user_id)?;
        escalation::check_missed_streak(
            &self.pool,
            &self.notifier,
            &cfg,
            &expired.task_id,
            &expired.user_id,
            &now_str,
        )
        .await?;
        checkins::get_by_id(&self.pool, id)
    }

    /// Manual escalation through the API. Without an explicit target the
    /// policy must route to the subject's manager, and one must exist.
    pub async fn escalate(
        &self,
        id: &str,
        input: &EscalateInput,
        now: DateTime<Utc>,
    ) -> Result<CheckIn, AppError> {
        validation::require_non_empty("reason", &input.reason)?;

        let existing = checkins::get_by_id(&self.pool, id)?;
        let cfg = self.config_for(&existing.task_id, &existing.user_id)?;
        let target = escalation::resolve_target(
            &self.pool,
            &cfg,
            &existing.user_id,
            input.escalate_to.as_deref(),
        )?
        .ok_or_else(|| {
            AppError::Validation(
                "escalate_to is required when the policy does not route to a manager".into(),
            )
        })?;

        let escalated = checkins::mark_escalated(
            &self.pool,
            id,
            &input.reason,
            Some(&target),
            &now.to_rfc3339(),
        )?;
        self.notifier
            .escalation_raised(&escalated, Some(&target), &input.reason)
            .await;
        Ok(escalated)
    }
}

/// Off-path enrichment: bounded call to the gateway, conditional write-back
/// gated per policy toggle, and the friction pass when the sentiment upgrade
/// flips the flag. Failures degrade to a warn log.
async fn run_enrichment(
    pool: DbPool,
    provider: Arc<dyn EnrichmentProvider>,
    notifier: Arc<dyn Notifier>,
    cfg: CheckInConfig,
    checkin: CheckIn,
    timeout: Duration,
) {
    let outcome = match tokio::time::timeout(timeout, provider.enrich(&checkin)).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            tracing::warn!(checkin_id = %checkin.id, "Enrichment failed: {e}");
            return;
        }
        Err(_) => {
            tracing::warn!(checkin_id = %checkin.id, "Enrichment timed out");
            return;
        }
    };

    let suggestion = if cfg.ai_suggestions_enabled {
        outcome.suggestion.as_deref()
    } else {
        None
    };
    let (confidence, sentiment) = if cfg.sentiment_analysis_enabled {
        (outcome.confidence, outcome.sentiment_score)
    } else {
        (if cfg.ai_suggestions_enabled { outcome.confidence } else { None }, None)
    };

    let updated = match checkins::apply_enrichment(
        &pool,
        &checkin.id,
        suggestion,
        confidence,
        sentiment,
        cfg.friction_threshold,
    ) {
        Ok(Some(row)) => row,
        Ok(None) => {
            tracing::debug!(checkin_id = %checkin.id, "Enrichment landed after a state change, dropped");
            return;
        }
        Err(e) => {
            tracing::warn!(checkin_id = %checkin.id, "Enrichment write-back failed: {e}");
            return;
        }
    };

    if updated.friction_detected && !checkin.friction_detected {
        let now = chrono::Utc::now().to_rfc3339();
        if let Err(e) =
            escalation::friction_escalate(&pool, &notifier, &cfg, &updated, &now).await
        {
            tracing::warn!(checkin_id = %updated.id, "Post-enrichment escalation failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_db;
    use crate::db::models::CheckInStatus;
    use crate::db::repos::subjects::test_helpers::{seed_task, seed_user};
    use crate::engine::enrichment::NoopEnrichment;
    use crate::engine::notify::LogNotifier;
    use chrono::TimeZone;

    fn engine(pool: DbPool) -> CheckInEngine {
        configs::ensure_org_default(&pool, "default", true).unwrap();
        CheckInEngine::new(
            pool,
            "default".into(),
            Arc::new(NoopEnrichment),
            Arc::new(LogNotifier),
            Duration::from_millis(100),
        )
    }

    fn utc(d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, d, h, mi, 0).unwrap()
    }

    async fn seed_pending(engine: &CheckInEngine) -> CheckIn {
        seed_user(engine.pool(), "mgr", None, "UTC");
        let user = seed_user(engine.pool(), "u1", Some("mgr"), "UTC");
        let task = seed_task(engine.pool(), "t1", &user, "2026-03-02T08:00:00+00:00");
        engine
            .create(
                &CreateCheckInInput {
                    task_id: task,
                    user_id: Some(user),
                    trigger_origin: None,
                    scheduled_at: None,
                },
                utc(2, 9, 0),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_defaults_to_assignee_and_grace_expiry() {
        let pool = init_test_db().unwrap();
        let engine = engine(pool);
        let user = seed_user(engine.pool(), "u1", None, "UTC");
        let task = seed_task(engine.pool(), "t1", &user, "2026-03-02T08:00:00+00:00");

        let created = engine
            .create(
                &CreateCheckInInput {
                    task_id: task,
                    user_id: None,
                    trigger_origin: None,
                    scheduled_at: None,
                },
                utc(2, 10, 0),
            )
            .await
            .unwrap();
        assert_eq!(created.user_id, "u1");
        assert_eq!(created.trigger_origin, TriggerOrigin::Manual);
        // default grace is 4 hours
        assert_eq!(created.expires_at.as_deref(), Some("2026-03-02T14:00:00+00:00"));
    }

    #[tokio::test]
    async fn test_create_unknown_task_is_not_found() {
        let pool = init_test_db().unwrap();
        let engine = engine(pool);
        let result = engine
            .create(
                &CreateCheckInInput {
                    task_id: "ghost".into(),
                    user_id: None,
                    trigger_origin: None,
                    scheduled_at: None,
                },
                utc(2, 10, 0),
            )
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_respond_rejects_bad_indicator() {
        let pool = init_test_db().unwrap();
        let engine = engine(pool);
        let c = seed_pending(&engine).await;

        let result = engine
            .respond(
                &c.id,
                &RespondInput {
                    progress_indicator: "fine".into(),
                    ..Default::default()
                },
                utc(2, 9, 30),
            )
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        // State unchanged
        let row = checkins::get_by_id(engine.pool(), &c.id).unwrap();
        assert_eq!(row.status, CheckInStatus::Pending);
    }

    #[tokio::test]
    async fn test_blockers_force_friction_even_with_sentiment_disabled() {
        let pool = init_test_db().unwrap();
        let engine = engine(pool);
        // Disable both AI toggles on the org default
        let cfg = configs::resolve_effective(engine.pool(), "default", None, None, None).unwrap();
        configs::update(
            engine.pool(),
            &cfg.id,
            crate::db::models::UpdateConfigInput {
                sentiment_analysis_enabled: Some(false),
                ai_suggestions_enabled: Some(false),
                ..Default::default()
            },
        )
        .unwrap();

        let c = seed_pending(&engine).await;
        let responded = engine
            .respond(
                &c.id,
                &RespondInput {
                    progress_indicator: "blocked".into(),
                    blockers_reported: Some("blocked on API access".into()),
                    ..Default::default()
                },
                utc(2, 9, 30),
            )
            .await
            .unwrap();
        assert!(responded.friction_detected);
        // Friction path escalated the row synchronously (manager exists)
        assert_eq!(responded.status, CheckInStatus::Escalated);
        assert_eq!(
            responded.escalation_reason.as_deref(),
            Some("friction detected in response")
        );
    }

    #[tokio::test]
    async fn test_clean_respond_stays_responded() {
        let pool = init_test_db().unwrap();
        let engine = engine(pool);
        let c = seed_pending(&engine).await;

        let responded = engine
            .respond(
                &c.id,
                &RespondInput {
                    progress_indicator: "on_track".into(),
                    progress_notes: Some("all good".into()),
                    ..Default::default()
                },
                utc(2, 9, 30),
            )
            .await
            .unwrap();
        assert_eq!(responded.status, CheckInStatus::Responded);
        assert!(!responded.friction_detected);
    }

    #[tokio::test]
    async fn test_skip_then_streak_pass_runs() {
        let pool = init_test_db().unwrap();
        let engine = engine(pool);
        let c = seed_pending(&engine).await;

        let skipped = engine
            .skip(
                &c.id,
                &SkipInput {
                    reason: Some("in a workshop".into()),
                },
                utc(2, 10, 0),
            )
            .await
            .unwrap();
        // One miss: below the default threshold of three
        assert_eq!(skipped.status, CheckInStatus::Skipped);
        assert_eq!(skipped.skip_reason.as_deref(), Some("in a workshop"));
    }

    #[tokio::test]
    async fn test_manual_escalate_requires_target_without_manager_routing() {
        let pool = init_test_db().unwrap();
        let engine = engine(pool);
        let cfg = configs::resolve_effective(engine.pool(), "default", None, None, None).unwrap();
        configs::update(
            engine.pool(),
            &cfg.id,
            crate::db::models::UpdateConfigInput {
                escalate_to_manager: Some(false),
                ..Default::default()
            },
        )
        .unwrap();

        let c = seed_pending(&engine).await;
        let result = engine
            .escalate(
                &c.id,
                &EscalateInput {
                    reason: "stuck for days".into(),
                    escalate_to: None,
                },
                utc(2, 11, 0),
            )
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let explicit = engine
            .escalate(
                &c.id,
                &EscalateInput {
                    reason: "stuck for days".into(),
                    escalate_to: Some("lead".into()),
                },
                utc(2, 11, 0),
            )
            .await
            .unwrap();
        assert_eq!(explicit.escalated_to.as_deref(), Some("lead"));
    }

    #[tokio::test]
    async fn test_expire_loser_conflict() {
        let pool = init_test_db().unwrap();
        let engine = engine(pool);
        let c = seed_pending(&engine).await;

        engine.expire(&c.id, utc(2, 14, 0)).await.unwrap();
        let late = engine
            .respond(
                &c.id,
                &RespondInput {
                    progress_indicator: "on_track".into(),
                    ..Default::default()
                },
                utc(2, 14, 1),
            )
            .await;
        assert!(matches!(late, Err(AppError::Conflict(_))));
    }
}
