use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use proptest::prelude::*;

use pulsecheck::db::models::CheckInConfig;
use pulsecheck::engine::scheduler;

fn config(
    interval_hours: i64,
    work_start_hour: u32,
    work_end_hour: u32,
    excluded_weekdays: Vec<u8>,
    grace_hours: Option<i64>,
) -> CheckInConfig {
    CheckInConfig {
        id: "cfg".into(),
        org_id: "default".into(),
        team_id: None,
        user_id: None,
        task_id: None,
        enabled: true,
        interval_hours,
        friction_threshold: 0.3,
        max_daily_checkins: 3,
        work_start_hour,
        work_end_hour,
        respect_timezone: true,
        excluded_weekdays,
        auto_escalate_after_missed: 3,
        escalate_to_manager: true,
        ai_suggestions_enabled: true,
        sentiment_analysis_enabled: true,
        grace_hours,
        created_at: "2026-01-01T00:00:00+00:00".into(),
        updated_at: "2026-01-01T00:00:00+00:00".into(),
    }
}

prop_compose! {
    fn arb_work_window()(start in 0u32..22)(start in Just(start), end in (start + 1)..=23u32) -> (u32, u32) {
        (start, end)
    }
}

prop_compose! {
    // At most 6 exclusions, so at least one weekday stays eligible.
    fn arb_excluded()(mask in 0u8..128) -> Vec<u8> {
        let days: Vec<u8> = (0..7).filter(|d| mask & (1 << d) != 0).collect();
        if days.len() == 7 { vec![] } else { days }
    }
}

fn arb_zone() -> impl Strategy<Value = Tz> {
    prop_oneof![
        Just(Tz::UTC),
        Just("America/New_York".parse::<Tz>().unwrap()),
        Just("Europe/Prague".parse::<Tz>().unwrap()),
        Just("Asia/Tokyo".parse::<Tz>().unwrap()),
        Just("Australia/Sydney".parse::<Tz>().unwrap()),
    ]
}

fn arb_instant() -> impl Strategy<Value = DateTime<Utc>> {
    // Whole of 2026 at minute resolution
    (0i64..365 * 24 * 60).prop_map(|minutes| {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
    })
}

proptest! {
    #[test]
    fn slot_lands_inside_work_window(
        candidate in arb_instant(),
        (start, end) in arb_work_window(),
        excluded in arb_excluded(),
        tz in arb_zone(),
    ) {
        let cfg = config(24, start, end, excluded, None);
        let slot = scheduler::next_slot(&cfg, candidate, tz);
        let local = slot.with_timezone(&tz);
        prop_assert!(local.hour() >= start, "slot {local} opens before {start}");
        prop_assert!(local.hour() < end, "slot {local} past closing hour {end}");
    }

    #[test]
    fn slot_never_lands_on_excluded_weekday(
        candidate in arb_instant(),
        (start, end) in arb_work_window(),
        excluded in arb_excluded(),
        tz in arb_zone(),
    ) {
        let cfg = config(24, start, end, excluded.clone(), None);
        let slot = scheduler::next_slot(&cfg, candidate, tz);
        let weekday = slot.with_timezone(&tz).weekday().num_days_from_monday() as u8;
        prop_assert!(!excluded.contains(&weekday));
    }

    #[test]
    fn slot_never_precedes_candidate(
        candidate in arb_instant(),
        (start, end) in arb_work_window(),
        excluded in arb_excluded(),
        tz in arb_zone(),
    ) {
        let cfg = config(24, start, end, excluded, None);
        let slot = scheduler::next_slot(&cfg, candidate, tz);
        prop_assert!(slot >= candidate - Duration::hours(1),
            "slot {slot} precedes candidate {candidate}");
        // An in-window candidate is kept exactly
        let local = candidate.with_timezone(&tz);
        let wd = local.weekday().num_days_from_monday() as u8;
        if !cfg.excluded_weekdays.contains(&wd)
            && (local.hour() as i64) >= cfg.work_start_hour as i64
            && (local.hour() as i64) < cfg.work_end_hour as i64
        {
            prop_assert_eq!(slot, candidate);
        }
    }

    #[test]
    fn next_cycle_advances_by_at_least_the_interval_or_window_roll(
        last in arb_instant(),
        interval in 1i64..72,
        (start, end) in arb_work_window(),
        tz in arb_zone(),
    ) {
        let cfg = config(interval, start, end, vec![], None);
        let activated = last - Duration::days(1);
        let slot = scheduler::compute_next(&cfg, Some(last), activated, tz);
        prop_assert!(slot >= last + Duration::hours(interval) - Duration::hours(1));
    }

    #[test]
    fn expiry_strictly_follows_slot(
        slot in arb_instant(),
        grace in proptest::option::of(1i64..48),
    ) {
        let cfg = config(24, 9, 17, vec![], grace);
        let expiry = scheduler::expiry_for(&cfg, slot);
        prop_assert!(expiry > slot);
        prop_assert_eq!(expiry - slot, Duration::hours(grace.unwrap_or(4)));
    }

    #[test]
    fn cap_window_spans_the_slot(
        slot in arb_instant(),
        tz in arb_zone(),
    ) {
        let (start, end) = scheduler::cap_window(slot, tz);
        let slot_str = slot.to_rfc3339();
        let start_dt = DateTime::parse_from_rfc3339(&start).unwrap().with_timezone(&Utc);
        let end_dt = DateTime::parse_from_rfc3339(&end).unwrap().with_timezone(&Utc);
        prop_assert!(start_dt <= slot, "window start {start} after slot {slot_str}");
        prop_assert!(slot < end_dt, "slot {slot_str} outside window end {end}");
        // Local days are 23-25 hours around DST shifts
        let span = end_dt - start_dt;
        prop_assert!(span >= Duration::hours(23) && span <= Duration::hours(25));
    }

    #[test]
    fn next_day_opening_lands_on_a_later_eligible_day(
        slot in arb_instant(),
        (start, end) in arb_work_window(),
        excluded in arb_excluded(),
        tz in arb_zone(),
    ) {
        let cfg = config(24, start, end, excluded.clone(), None);
        let next = scheduler::next_day_opening(&cfg, slot, tz);
        prop_assert!(next > slot);
        let local = next.with_timezone(&tz);
        let wd = local.weekday().num_days_from_monday() as u8;
        prop_assert!(!excluded.contains(&wd));
        prop_assert!(local.date_naive() > slot.with_timezone(&tz).date_naive());
    }
}
