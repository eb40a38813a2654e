use rusqlite::{params, Row};

use crate::db::models::{CheckInConfig, CreateConfigInput, UpdateConfigInput};
use crate::db::DbPool;
use crate::error::AppError;
use crate::validation::require_valid_id;

fn validate_hours(start: u32, end: u32) -> Result<(), AppError> {
    if start >= end || end > 24 {
        return Err(AppError::Validation(format!(
            "work_start_hour ({start}) must be before work_end_hour ({end}), both within 0-24"
        )));
    }
    Ok(())
}

fn validate_weekdays(days: &[u8]) -> Result<(), AppError> {
    if days.iter().any(|d| *d > 6) {
        return Err(AppError::Validation(
            "excluded_weekdays values must be 0 (Monday) through 6 (Sunday)".into(),
        ));
    }
    if days.len() >= 7 {
        return Err(AppError::Validation(
            "excluded_weekdays cannot exclude every day of the week".into(),
        ));
    }
    Ok(())
}

fn validate_bounds(input: &CreateConfigInput) -> Result<(), AppError> {
    if let Some(n) = input.interval_hours {
        if n < 1 {
            return Err(AppError::Validation("interval_hours must be at least 1".into()));
        }
    }
    if let Some(n) = input.max_daily_checkins {
        if n < 1 {
            return Err(AppError::Validation("max_daily_checkins must be at least 1".into()));
        }
    }
    if let Some(t) = input.friction_threshold {
        if !(0.0..=1.0).contains(&t) {
            return Err(AppError::Validation(
                "friction_threshold must be between 0 and 1".into(),
            ));
        }
    }
    if let Some(n) = input.auto_escalate_after_missed {
        if n < 1 {
            return Err(AppError::Validation(
                "auto_escalate_after_missed must be at least 1".into(),
            ));
        }
    }
    if let Some(n) = input.grace_hours {
        if n < 1 {
            return Err(AppError::Validation("grace_hours must be at least 1".into()));
        }
    }
    validate_hours(
        input.work_start_hour.unwrap_or(9),
        input.work_end_hour.unwrap_or(17),
    )?;
    if let Some(ref days) = input.excluded_weekdays {
        validate_weekdays(days)?;
    }
    // A row's scope is exactly one of org default / team / user / task.
    let scopes = [
        input.team_id.is_some(),
        input.user_id.is_some(),
        input.task_id.is_some(),
    ];
    if scopes.iter().filter(|s| **s).count() > 1 {
        return Err(AppError::Validation(
            "config scope must be exactly one of team_id, user_id, task_id (or none for the org default)".into(),
        ));
    }
    Ok(())
}

fn row_to_config(row: &Row) -> rusqlite::Result<CheckInConfig> {
    let weekdays_json: String = row.get("excluded_weekdays")?;
    let excluded_weekdays: Vec<u8> = serde_json::from_str(&weekdays_json).unwrap_or_default();
    Ok(CheckInConfig {
        id: row.get("id")?,
        org_id: row.get("org_id")?,
        team_id: row.get("team_id")?,
        user_id: row.get("user_id")?,
        task_id: row.get("task_id")?,
        enabled: row.get::<_, i32>("enabled")? != 0,
        interval_hours: row.get("interval_hours")?,
        friction_threshold: row.get("friction_threshold")?,
        max_daily_checkins: row.get("max_daily_checkins")?,
        work_start_hour: row.get("work_start_hour")?,
        work_end_hour: row.get("work_end_hour")?,
        respect_timezone: row.get::<_, i32>("respect_timezone")? != 0,
        excluded_weekdays,
        auto_escalate_after_missed: row.get("auto_escalate_after_missed")?,
        escalate_to_manager: row.get::<_, i32>("escalate_to_manager")? != 0,
        ai_suggestions_enabled: row.get::<_, i32>("ai_suggestions_enabled")? != 0,
        sentiment_analysis_enabled: row.get::<_, i32>("sentiment_analysis_enabled")? != 0,
        grace_hours: row.get("grace_hours")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn create(pool: &DbPool, input: CreateConfigInput) -> Result<CheckInConfig, AppError> {
    require_valid_id("org_id", &input.org_id)?;
    validate_bounds(&input)?;

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let weekdays = serde_json::to_string(&input.excluded_weekdays.clone().unwrap_or(vec![5, 6]))?;

    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO checkin_configs
         (id, org_id, team_id, user_id, task_id, enabled, interval_hours, friction_threshold,
          max_daily_checkins, work_start_hour, work_end_hour, respect_timezone, excluded_weekdays,
          auto_escalate_after_missed, escalate_to_manager, ai_suggestions_enabled,
          sentiment_analysis_enabled, grace_hours, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?19)",
        params![
            id,
            input.org_id,
            input.team_id,
            input.user_id,
            input.task_id,
            input.enabled.unwrap_or(true) as i32,
            input.interval_hours.unwrap_or(24),
            input.friction_threshold.unwrap_or(0.3),
            input.max_daily_checkins.unwrap_or(3),
            input.work_start_hour.unwrap_or(9),
            input.work_end_hour.unwrap_or(17),
            input.respect_timezone.unwrap_or(true) as i32,
            weekdays,
            input.auto_escalate_after_missed.unwrap_or(3),
            input.escalate_to_manager.unwrap_or(true) as i32,
            input.ai_suggestions_enabled.unwrap_or(true) as i32,
            input.sentiment_analysis_enabled.unwrap_or(true) as i32,
            input.grace_hours,
            now,
        ],
    )?;

    get_by_id(pool, &id)
}

pub fn get_by_id(pool: &DbPool, id: &str) -> Result<CheckInConfig, AppError> {
    let conn = pool.get()?;
    conn.query_row(
        "SELECT * FROM checkin_configs WHERE id = ?1",
        params![id],
        row_to_config,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => AppError::NotFound(format!("Config {id}")),
        other => AppError::Database(other),
    })
}

pub fn list(pool: &DbPool, org_id: &str) -> Result<Vec<CheckInConfig>, AppError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT * FROM checkin_configs WHERE org_id = ?1 ORDER BY created_at DESC",
    )?;
    let rows = stmt.query_map(params![org_id], row_to_config)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}

pub fn update(pool: &DbPool, id: &str, input: UpdateConfigInput) -> Result<CheckInConfig, AppError> {
    let existing = get_by_id(pool, id)?;

    validate_hours(
        input.work_start_hour.unwrap_or(existing.work_start_hour),
        input.work_end_hour.unwrap_or(existing.work_end_hour),
    )?;
    if let Some(n) = input.interval_hours {
        if n < 1 {
            return Err(AppError::Validation("interval_hours must be at least 1".into()));
        }
    }
    if let Some(n) = input.max_daily_checkins {
        if n < 1 {
            return Err(AppError::Validation("max_daily_checkins must be at least 1".into()));
        }
    }
    if let Some(t) = input.friction_threshold {
        if !(0.0..=1.0).contains(&t) {
            return Err(AppError::Validation(
                "friction_threshold must be between 0 and 1".into(),
            ));
        }
    }
    if let Some(n) = input.auto_escalate_after_missed {
        if n < 1 {
            return Err(AppError::Validation(
                "auto_escalate_after_missed must be at least 1".into(),
            ));
        }
    }
    if let Some(ref days) = input.excluded_weekdays {
        validate_weekdays(days)?;
    }
    if let Some(Some(n)) = input.grace_hours {
        if n < 1 {
            return Err(AppError::Validation("grace_hours must be at least 1".into()));
        }
    }

    let now = chrono::Utc::now().to_rfc3339();
    let weekdays = input
        .excluded_weekdays
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let conn = pool.get()?;

    // Build dynamic SET clause
    let mut sets: Vec<String> = vec!["updated_at = ?1".into()];
    let mut param_idx = 2u32;

    push_field!(input.enabled, "enabled", sets, param_idx);
    push_field!(input.interval_hours, "interval_hours", sets, param_idx);
    push_field!(input.friction_threshold, "friction_threshold", sets, param_idx);
    push_field!(input.max_daily_checkins, "max_daily_checkins", sets, param_idx);
    push_field!(input.work_start_hour, "work_start_hour", sets, param_idx);
    push_field!(input.work_end_hour, "work_end_hour", sets, param_idx);
    push_field!(input.respect_timezone, "respect_timezone", sets, param_idx);
    push_field!(weekdays, "excluded_weekdays", sets, param_idx);
    push_field!(
        input.auto_escalate_after_missed,
        "auto_escalate_after_missed",
        sets,
        param_idx
    );
    push_field!(input.escalate_to_manager, "escalate_to_manager", sets, param_idx);
    push_field!(
        input.ai_suggestions_enabled,
        "ai_suggestions_enabled",
        sets,
        param_idx
    );
    push_field!(
        input.sentiment_analysis_enabled,
        "sentiment_analysis_enabled",
        sets,
        param_idx
    );
    push_field!(input.grace_hours, "grace_hours", sets, param_idx);

    let sql = format!(
        "UPDATE checkin_configs SET {} WHERE id = ?{}",
        sets.join(", "),
        param_idx
    );

    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(now)];

    if let Some(v) = input.enabled {
        param_values.push(Box::new(v as i32));
    }
    if let Some(v) = input.interval_hours {
        param_values.push(Box::new(v));
    }
    if let Some(v) = input.friction_threshold {
        param_values.push(Box::new(v));
    }
    if let Some(v) = input.max_daily_checkins {
        param_values.push(Box::new(v));
    }
    if let Some(v) = input.work_start_hour {
        param_values.push(Box::new(v));
    }
    if let Some(v) = input.work_end_hour {
        param_values.push(Box::new(v));
    }
    if let Some(v) = input.respect_timezone {
        param_values.push(Box::new(v as i32));
    }
    if let Some(v) = weekdays {
        param_values.push(Box::new(v));
    }
    if let Some(v) = input.auto_escalate_after_missed {
        param_values.push(Box::new(v));
    }
    if let Some(v) = input.escalate_to_manager {
        param_values.push(Box::new(v as i32));
    }
    if let Some(v) = input.ai_suggestions_enabled {
        param_values.push(Box::new(v as i32));
    }
    if let Some(v) = input.sentiment_analysis_enabled {
        param_values.push(Box::new(v as i32));
    }
    if let Some(v) = input.grace_hours {
        param_values.push(Box::new(v));
    }
    param_values.push(Box::new(id.to_string()));

    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    conn.execute(&sql, params_ref.as_slice())?;

    get_by_id(pool, id)
}

pub fn delete(pool: &DbPool, id: &str) -> Result<bool, AppError> {
    let conn = pool.get()?;
    let rows = conn.execute("DELETE FROM checkin_configs WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

/// Resolve the single effective config for a subject, most specific wins
/// wholesale: task scope, then user, then team, then the org-wide default.
/// A missing org default is a policy error: it must exist (checked at
/// startup) and its absence means operator misconfiguration.
pub fn resolve_effective(
    pool: &DbPool,
    org_id: &str,
    team_id: Option<&str>,
    user_id: Option<&str>,
    task_id: Option<&str>,
) -> Result<CheckInConfig, AppError> {
    let conn = pool.get()?;

    let scoped = |sql: &str, key: &str| -> Result<Option<CheckInConfig>, AppError> {
        match conn.query_row(sql, params![org_id, key], row_to_config) {
            Ok(cfg) => Ok(Some(cfg)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(AppError::Database(e)),
        }
    };

    if let Some(task_id) = task_id {
        if let Some(cfg) = scoped(
            "SELECT * FROM checkin_configs WHERE org_id = ?1 AND task_id = ?2",
            task_id,
        )? {
            return Ok(cfg);
        }
    }
    if let Some(user_id) = user_id {
        if let Some(cfg) = scoped(
            "SELECT * FROM checkin_configs WHERE org_id = ?1 AND user_id = ?2 AND task_id IS NULL",
            user_id,
        )? {
            return Ok(cfg);
        }
    }
    if let Some(team_id) = team_id {
        if let Some(cfg) = scoped(
            "SELECT * FROM checkin_configs
             WHERE org_id = ?1 AND team_id = ?2 AND user_id IS NULL AND task_id IS NULL",
            team_id,
        )? {
            return Ok(cfg);
        }
    }

    conn.query_row(
        "SELECT * FROM checkin_configs
         WHERE org_id = ?1 AND team_id IS NULL AND user_id IS NULL AND task_id IS NULL",
        params![org_id],
        row_to_config,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            AppError::Policy(format!("No default check-in config for org {org_id}"))
        }
        other => AppError::Database(other),
    })
}

/// Verify the org default exists; optionally seed one. Called at startup;
/// the process must not serve traffic without a resolvable policy.
pub fn ensure_org_default(pool: &DbPool, org_id: &str, seed: bool) -> Result<(), AppError> {
    match resolve_effective(pool, org_id, None, None, None) {
        Ok(_) => Ok(()),
        Err(AppError::Policy(_)) if seed => {
            tracing::info!(org_id = %org_id, "Seeding default check-in config");
            create(
                pool,
                CreateConfigInput {
                    org_id: org_id.into(),
                    ..Default::default()
                },
            )?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_db;

    fn org_default(pool: &DbPool) -> CheckInConfig {
        create(
            pool,
            CreateConfigInput {
                org_id: "org-1".into(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_create_applies_defaults() {
        let pool = init_test_db().unwrap();
        let cfg = org_default(&pool);
        assert!(cfg.enabled);
        assert_eq!(cfg.interval_hours, 24);
        assert_eq!(cfg.max_daily_checkins, 3);
        assert_eq!(cfg.work_start_hour, 9);
        assert_eq!(cfg.work_end_hour, 17);
        assert_eq!(cfg.excluded_weekdays, vec![5, 6]);
        assert_eq!(cfg.grace_hours, None);
        assert_eq!(cfg.grace_hours_or_default(), 4);
    }

    #[test]
    fn test_invalid_work_hours_rejected() {
        let pool = init_test_db().unwrap();
        let result = create(
            &pool,
            CreateConfigInput {
                org_id: "org-1".into(),
                work_start_hour: Some(17),
                work_end_hour: Some(9),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_invalid_interval_rejected() {
        let pool = init_test_db().unwrap();
        let result = create(
            &pool,
            CreateConfigInput {
                org_id: "org-1".into(),
                interval_hours: Some(0),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_multi_scope_rejected() {
        let pool = init_test_db().unwrap();
        let result = create(
            &pool,
            CreateConfigInput {
                org_id: "org-1".into(),
                user_id: Some("u1".into()),
                task_id: Some("t1".into()),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_resolution_most_specific_wins() {
        let pool = init_test_db().unwrap();
        org_default(&pool);
        create(
            &pool,
            CreateConfigInput {
                org_id: "org-1".into(),
                team_id: Some("team-1".into()),
                interval_hours: Some(48),
                ..Default::default()
            },
        )
        .unwrap();
        create(
            &pool,
            CreateConfigInput {
                org_id: "org-1".into(),
                user_id: Some("u1".into()),
                interval_hours: Some(12),
                ..Default::default()
            },
        )
        .unwrap();
        create(
            &pool,
            CreateConfigInput {
                org_id: "org-1".into(),
                task_id: Some("t1".into()),
                interval_hours: Some(6),
                ..Default::default()
            },
        )
        .unwrap();

        // Task scope beats everything
        let cfg =
            resolve_effective(&pool, "org-1", Some("team-1"), Some("u1"), Some("t1")).unwrap();
        assert_eq!(cfg.interval_hours, 6);

        // User scope beats team and default
        let cfg =
            resolve_effective(&pool, "org-1", Some("team-1"), Some("u1"), Some("t-other")).unwrap();
        assert_eq!(cfg.interval_hours, 12);

        // Team scope beats default
        let cfg =
            resolve_effective(&pool, "org-1", Some("team-1"), Some("u-other"), None).unwrap();
        assert_eq!(cfg.interval_hours, 48);

        // Nothing matches: org default
        let cfg = resolve_effective(&pool, "org-1", Some("team-x"), Some("u-x"), None).unwrap();
        assert_eq!(cfg.interval_hours, 24);
    }

    #[test]
    fn test_missing_org_default_is_policy_error() {
        let pool = init_test_db().unwrap();
        let result = resolve_effective(&pool, "org-none", None, None, None);
        assert!(matches!(result, Err(AppError::Policy(_))));
    }

    #[test]
    fn test_ensure_org_default_seeds() {
        let pool = init_test_db().unwrap();
        assert!(ensure_org_default(&pool, "org-1", false).is_err());
        ensure_org_default(&pool, "org-1", true).unwrap();
        // Now resolvable, and a second ensure is a no-op
        ensure_org_default(&pool, "org-1", false).unwrap();
    }

    #[test]
    fn test_update_patch_semantics() {
        let pool = init_test_db().unwrap();
        let cfg = org_default(&pool);

        let updated = update(
            &pool,
            &cfg.id,
            UpdateConfigInput {
                enabled: Some(false),
                interval_hours: Some(8),
                excluded_weekdays: Some(vec![6]),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(!updated.enabled);
        assert_eq!(updated.interval_hours, 8);
        assert_eq!(updated.excluded_weekdays, vec![6]);
        // Untouched fields survive
        assert_eq!(updated.work_start_hour, 9);

        // Cross-field validation uses the merged view
        let result = update(
            &pool,
            &cfg.id,
            UpdateConfigInput {
                work_end_hour: Some(8),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_delete() {
        let pool = init_test_db().unwrap();
        let cfg = org_default(&pool);
        assert!(delete(&pool, &cfg.id).unwrap());
        assert!(!delete(&pool, &cfg.id).unwrap());
        assert!(get_by_id(&pool, &cfg.id).is_err());
    }
}
