use chrono::{DateTime, Datelike, Days, Duration, LocalResult, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::db::models::CheckInConfig;

/// Resolve a local wall-clock hour on a date to a zoned instant. DST gaps
/// push forward hour by hour until a representable time is found; ambiguous
/// times take the earlier offset.
fn at_hour(tz: Tz, date: NaiveDate, hour: u32) -> DateTime<Tz> {
    let mut h = hour;
    loop {
        if let Some(naive) = date.and_hms_opt(h, 0, 0) {
            match tz.from_local_datetime(&naive) {
                LocalResult::Single(dt) => return dt,
                LocalResult::Ambiguous(earlier, _) => return earlier,
                LocalResult::None => {}
            }
        }
        h += 1;
        if h >= 24 {
            // Whole day unrepresentable cannot happen for real zones; fall
            // back to midnight UTC of the next day.
            let next = date + Days::new(1);
            return tz
                .from_utc_datetime(&next.and_hms_opt(0, 0, 0).unwrap_or_default());
        }
    }
}

fn weekday_index(dt: &DateTime<Tz>) -> u8 {
    dt.weekday().num_days_from_monday() as u8
}

/// Roll a candidate instant forward into the policy's working window: a
/// non-excluded weekday, local time inside [work_start_hour, work_end_hour).
/// A candidate already inside the window is returned unchanged.
fn roll_into_window(cfg: &CheckInConfig, mut local: DateTime<Tz>) -> DateTime<Tz> {
    let tz = local.timezone();
    loop {
        if cfg.excluded_weekdays.contains(&weekday_index(&local)) {
            local = at_hour(tz, local.date_naive() + Days::new(1), cfg.work_start_hour);
            continue;
        }
        let hour = local.hour();
        if hour < cfg.work_start_hour {
            local = at_hour(tz, local.date_naive(), cfg.work_start_hour);
            continue;
        }
        if hour >= cfg.work_end_hour {
            local = at_hour(tz, local.date_naive() + Days::new(1), cfg.work_start_hour);
            continue;
        }
        return local;
    }
}

/// The effective zone for a policy: the subject's zone when the policy says
/// to respect it, UTC otherwise. Unparseable zone names fall back to UTC.
pub fn effective_zone(cfg: &CheckInConfig, subject_tz: &str) -> Tz {
    if cfg.respect_timezone {
        subject_tz.parse().unwrap_or(Tz::UTC)
    } else {
        Tz::UTC
    }
}

/// Earliest eligible slot at or after `candidate`.
pub fn next_slot(cfg: &CheckInConfig, candidate: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    roll_into_window(cfg, candidate.with_timezone(&tz)).with_timezone(&Utc)
}

/// The next check-in slot for a pair: one interval past the previous slot,
/// or the task's activation instant for the first cycle, rolled into the
/// working window.
pub fn compute_next(
    cfg: &CheckInConfig,
    last_scheduled_at: Option<DateTime<Utc>>,
    activated_at: DateTime<Utc>,
    tz: Tz,
) -> DateTime<Utc> {
    let candidate = match last_scheduled_at {
        Some(last) => last + Duration::hours(cfg.interval_hours),
        None => activated_at,
    };
    next_slot(cfg, candidate, tz)
}

/// Expiry instant for a slot: the policy's grace period after the slot.
pub fn expiry_for(cfg: &CheckInConfig, scheduled_at: DateTime<Utc>) -> DateTime<Utc> {
    scheduled_at + Duration::hours(cfg.grace_hours_or_default())
}

/// The local calendar day containing `slot`, as UTC RFC3339 bounds
/// [start, end) for the daily-cap count.
pub fn cap_window(slot: DateTime<Utc>, tz: Tz) -> (String, String) {
    let local = slot.with_timezone(&tz);
    let start = at_hour(tz, local.date_naive(), 0);
    let end = at_hour(tz, local.date_naive() + Days::new(1), 0);
    (
        start.with_timezone(&Utc).to_rfc3339(),
        end.with_timezone(&Utc).to_rfc3339(),
    )
}

/// Opening slot of the next eligible working day after the day containing
/// `slot`. Used when the daily cap is already reached.
pub fn next_day_opening(cfg: &CheckInConfig, slot: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let local = slot.with_timezone(&tz);
    let next = at_hour(tz, local.date_naive() + Days::new(1), cfg.work_start_hour);
    roll_into_window(cfg, next).with_timezone(&Utc)
}
