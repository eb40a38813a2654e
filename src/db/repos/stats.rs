use crate::db::models::{CheckInStatistics, FeedEntry, FeedFilter, StatsScope};
use crate::db::repos::checkins::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::db::DbPool;
use crate::error::AppError;

/// Aggregate counters over check-ins in scope. Escalated cycles count toward
/// the non-responded side of the response rate; a zero-row scope reports a
/// rate of 0.0 rather than dividing by zero.
pub fn statistics(pool: &DbPool, scope: &StatsScope) -> Result<CheckInStatistics, AppError> {
    let mut sql = String::from(
        "SELECT
           COUNT(*) AS total,
           SUM(CASE WHEN c.status = 'pending' THEN 1 ELSE 0 END) AS pending,
           SUM(CASE WHEN c.status = 'responded' THEN 1 ELSE 0 END) AS responded,
           SUM(CASE WHEN c.status = 'skipped' THEN 1 ELSE 0 END) AS skipped,
           SUM(CASE WHEN c.status = 'expired' THEN 1 ELSE 0 END) AS expired,
           SUM(CASE WHEN c.status = 'escalated' THEN 1 ELSE 0 END) AS escalated,
           AVG(CASE WHEN c.status = 'responded' AND c.responded_at IS NOT NULL
                    THEN (julianday(c.responded_at) - julianday(c.scheduled_at)) * 1440.0
               END) AS avg_response_minutes,
           SUM(CASE WHEN c.friction_detected = 1 THEN 1 ELSE 0 END) AS friction
         FROM checkins c WHERE 1=1",
    );
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut idx = 1u32;

    if let Some(ref user_id) = scope.user_id {
        sql.push_str(&format!(" AND c.user_id = ?{idx}"));
        param_values.push(Box::new(user_id.clone()));
        idx += 1;
    }
    if let Some(ref team_id) = scope.team_id {
        sql.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM tasks t WHERE t.id = c.task_id AND t.team_id = ?{idx})"
        ));
        param_values.push(Box::new(team_id.clone()));
        idx += 1;
    }
    if let Some(days) = scope.days {
        if days < 1 {
            return Err(AppError::Validation("days must be at least 1".into()));
        }
        let cutoff = (chrono::Utc::now() - chrono::Duration::days(days)).to_rfc3339();
        sql.push_str(&format!(" AND c.scheduled_at >= ?{idx}"));
        param_values.push(Box::new(cutoff));
    }

    let conn = pool.get()?;
    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let stats = conn.query_row(&sql, params_ref.as_slice(), |row| {
        let total: i64 = row.get("total")?;
        let responded: i64 = row.get::<_, Option<i64>>("responded")?.unwrap_or(0);
        let response_rate = if total > 0 {
            responded as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Ok(CheckInStatistics {
            total,
            pending: row.get::<_, Option<i64>>("pending")?.unwrap_or(0),
            responded,
            skipped: row.get::<_, Option<i64>>("skipped")?.unwrap_or(0),
            expired: row.get::<_, Option<i64>>("expired")?.unwrap_or(0),
            escalated: row.get::<_, Option<i64>>("escalated")?.unwrap_or(0),
            response_rate,
            avg_response_time_minutes: row.get("avg_response_minutes")?,
            friction_count: row.get::<_, Option<i64>>("friction")?.unwrap_or(0),
        })
    })?;
    Ok(stats)
}

/// Manager-facing feed: check-ins joined with subject names, newest first,
/// each annotated with whether it needs attention and why.
pub fn manager_feed(pool: &DbPool, filter: &FeedFilter, now: &str) -> Result<Vec<FeedEntry>, AppError> {
    let mut sql = String::from(
        "SELECT c.*, u.name AS user_name, t.title AS task_title
         FROM checkins c
         JOIN users u ON u.id = c.user_id
         JOIN tasks t ON t.id = c.task_id
         WHERE 1=1",
    );
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut idx = 1u32;

    if let Some(ref manager_id) = filter.manager_id {
        sql.push_str(&format!(" AND u.manager_id = ?{idx}"));
        param_values.push(Box::new(manager_id.clone()));
        idx += 1;
    }
    if filter.needs_attention.unwrap_or(false) {
        sql.push_str(&format!(
            " AND (c.escalated = 1 OR c.friction_detected = 1
               OR (c.status = 'pending' AND c.expires_at IS NOT NULL AND c.expires_at <= ?{idx}))"
        ));
        param_values.push(Box::new(now.to_string()));
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
    let now_owned = now.to_string();
    let rows = stmt.query_map(params_ref.as_slice(), move |row| {
        let checkin = crate::db::repos::checkins::row_to_checkin(row)?;
        let overdue = checkin.status == crate::db::models::CheckInStatus::Pending
            && checkin
                .expires_at
                .as_deref()
                .map(|e| e <= now_owned.as_str())
                .unwrap_or(false);
        let attention_reason = if checkin.escalated {
            Some("escalated".to_string())
        } else if checkin.friction_detected {
            Some("friction detected".to_string())
        } else if overdue {
            Some("overdue".to_string())
        } else {
            None
        };
        Ok(FeedEntry {
            user_name: row.get("user_name")?,
            task_title: row.get("task_title")?,
            needs_attention: attention_reason.is_some(),
            attention_reason,
            checkin,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_db;
    use crate::db::models::{RespondInput, TriggerOrigin};
    use crate::db::repos::checkins;
    use crate::db::repos::subjects::test_helpers::{seed_task, seed_user};

    fn respond_ok() -> RespondInput {
        RespondInput {
            progress_indicator: "on_track".into(),
            ..Default::default()
        }
    }

    fn seed_cycle(
        pool: &crate::db::DbPool,
        task: &str,
        user: &str,
        scheduled: &str,
        outcome: &str,
    ) {
        let c = checkins::create(
            pool,
            task,
            user,
            TriggerOrigin::Scheduled,
            scheduled,
            Some("2026-03-09T00:00:00+00:00"),
        )
        .unwrap();
        match outcome {
            "responded" => {
                checkins::mark_responded(pool, &c.id, &respond_ok(), false, "2026-03-02T10:00:00+00:00")
                    .unwrap();
            }
            "skipped" => {
                checkins::mark_skipped(pool, &c.id, None, "2026-03-02T10:00:00+00:00").unwrap();
            }
            "expired" => {
                checkins::mark_expired(pool, &c.id, "2026-03-02T10:00:00+00:00").unwrap();
            }
            "escalated" => {
                checkins::mark_escalated(pool, &c.id, "manual", None, "2026-03-02T10:00:00+00:00")
                    .unwrap();
            }
            _ => {}
        }
    }

    #[test]
    fn test_statistics_counts_and_rate() {
        let pool = init_test_db().unwrap();
        let user = seed_user(&pool, "u1", None, "UTC");
        let task = seed_task(&pool, "t1", &user, "2026-03-01T08:00:00+00:00");

        seed_cycle(&pool, &task, &user, "2026-03-02T09:00:00+00:00", "responded");
        seed_cycle(&pool, &task, &user, "2026-03-03T09:00:00+00:00", "skipped");
        seed_cycle(&pool, &task, &user, "2026-03-04T09:00:00+00:00", "expired");
        seed_cycle(&pool, &task, &user, "2026-03-05T09:00:00+00:00", "escalated");

        let stats = statistics(&pool, &StatsScope::default()).unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.responded, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.escalated, 1);
        assert!((stats.response_rate - 25.0).abs() < 1e-9);
        // 09:00 -> 10:00 response on the one responded cycle
        let avg = stats.avg_response_time_minutes.unwrap();
        assert!((avg - 60.0).abs() < 0.5);
    }

    #[test]
    fn test_statistics_empty_scope() {
        let pool = init_test_db().unwrap();
        let stats = statistics(&pool, &StatsScope::default()).unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.response_rate, 0.0);
        assert!(stats.avg_response_time_minutes.is_none());
    }

    #[test]
    fn test_statistics_scoped_by_user() {
        let pool = init_test_db().unwrap();
        let u1 = seed_user(&pool, "u1", None, "UTC");
        let u2 = seed_user(&pool, "u2", None, "UTC");
        let t1 = seed_task(&pool, "t1", &u1, "2026-03-01T08:00:00+00:00");
        let t2 = seed_task(&pool, "t2", &u2, "2026-03-01T08:00:00+00:00");
        seed_cycle(&pool, &t1, &u1, "2026-03-02T09:00:00+00:00", "responded");
        seed_cycle(&pool, &t2, &u2, "2026-03-02T09:00:00+00:00", "skipped");

        let stats = statistics(
            &pool,
            &StatsScope {
                user_id: Some(u1),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.responded, 1);
    }

    #[test]
    fn test_feed_attention_annotations() {
        let pool = init_test_db().unwrap();
        let mgr = seed_user(&pool, "mgr", None, "UTC");
        let user = seed_user(&pool, "u1", Some(&mgr), "UTC");
        let task = seed_task(&pool, "t1", &user, "2026-03-01T08:00:00+00:00");

        // overdue pending
        checkins::create(
            &pool,
            &task,
            &user,
            TriggerOrigin::Scheduled,
            "2026-03-02T09:00:00+00:00",
            Some("2026-03-02T13:00:00+00:00"),
        )
        .unwrap();

        let now = "2026-03-02T14:00:00+00:00";
        let feed = manager_feed(
            &pool,
            &FeedFilter {
                manager_id: Some(mgr.clone()),
                ..Default::default()
            },
            now,
        )
        .unwrap();
        assert_eq!(feed.len(), 1);
        assert!(feed[0].needs_attention);
        assert_eq!(feed[0].attention_reason.as_deref(), Some("overdue"));
        assert_eq!(feed[0].user_name, "User u1");

        // not yet overdue: no attention flag
        let early = manager_feed(
            &pool,
            &FeedFilter {
                manager_id: Some(mgr.clone()),
                ..Default::default()
            },
            "2026-03-02T10:00:00+00:00",
        )
        .unwrap();
        assert!(!early[0].needs_attention);

        // attention-only filter hides clean rows
        let filtered = manager_feed(
            &pool,
            &FeedFilter {
                manager_id: Some(mgr),
                needs_attention: Some(true),
                ..Default::default()
            },
            "2026-03-02T10:00:00+00:00",
        )
        .unwrap();
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_feed_scoped_to_manager() {
        let pool = init_test_db().unwrap();
        let mgr_a = seed_user(&pool, "mgr_a", None, "UTC");
        let mgr_b = seed_user(&pool, "mgr_b", None, "UTC");
        let u1 = seed_user(&pool, "u1", Some(&mgr_a), "UTC");
        let u2 = seed_user(&pool, "u2", Some(&mgr_b), "UTC");
        let t1 = seed_task(&pool, "t1", &u1, "2026-03-01T08:00:00+00:00");
        let t2 = seed_task(&pool, "t2", &u2, "2026-03-01T08:00:00+00:00");
        seed_cycle(&pool, &t1, &u1, "2026-03-02T09:00:00+00:00", "responded");
        seed_cycle(&pool, &t2, &u2, "2026-03-02T09:00:00+00:00", "responded");

        let feed = manager_feed(
            &pool,
            &FeedFilter {
                manager_id: Some(mgr_a),
                ..Default::default()
            },
            "2026-03-02T10:00:00+00:00",
        )
        .unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].user_name, "User u1");
    }
}
