//! Next-fire-time computation.
//!
//! Pure functions over a schedule definition and a reference instant. Input
//! is validated at creation time (`validation.rs`), so `None` here means
//! "no further occurrence", never an error.

use std::str::FromStr;

use chrono::{DateTime, Duration, LocalResult, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use runforge_core::{Schedule, ScheduleSpec};

use crate::validation::normalize_cron;

/// Earliest occurrence of `schedule` strictly after `reference`.
///
/// For `once` schedules the fire instant itself is returned until the
/// schedule has fired, after which there is no further occurrence.
pub fn next_fire(schedule: &Schedule, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let tz = Tz::from_str(&schedule.timezone).ok()?;

    match &schedule.spec {
        ScheduleSpec::Cron { expression } => {
            let parsed = cron::Schedule::from_str(&normalize_cron(expression)).ok()?;
            // `after` is exclusive of the start instant itself.
            let start = reference.with_timezone(&tz);
            parsed.after(&start).next().map(|t| t.with_timezone(&Utc))
        }
        ScheduleSpec::Interval { seconds } => {
            let base = schedule.last_fired_at.unwrap_or(schedule.created_at);
            let step = Duration::seconds(*seconds as i64);
            if reference <= base {
                return Some(base + step);
            }
            // Smallest cadence point after the reference, anchored to the
            // previous fire so the cadence never drifts.
            let elapsed = (reference - base).num_seconds();
            let k = elapsed / *seconds as i64 + 1;
            Some(base + Duration::seconds(k * *seconds as i64))
        }
        ScheduleSpec::Weekday { days, time } => {
            let at = NaiveTime::parse_from_str(time, "%H:%M").ok()?;
            let local_ref = reference.with_timezone(&tz);
            // Scan up to a full week ahead (plus one day for the wrap case).
            for offset in 0..=7i64 {
                let date = local_ref.date_naive() + Duration::days(offset);
                let weekday = chrono::Datelike::weekday(&date).num_days_from_sunday() as u8;
                if !days.contains(&weekday) {
                    continue;
                }
                let candidate = match tz.from_local_datetime(&date.and_time(at)) {
                    // Wall-clock time skipped by a spring-forward transition:
                    // no fire that day.
                    LocalResult::None => continue,
                    LocalResult::Single(t) => t,
                    // Fall-back repeats the time; fire on the first occurrence.
                    LocalResult::Ambiguous(first, _) => first,
                };
                let candidate = candidate.with_timezone(&Utc);
                if candidate > reference {
                    return Some(candidate);
                }
            }
            None
        }
        ScheduleSpec::Once { at } => {
            if schedule.last_fired_at.is_some() {
                None
            } else {
                Some(*at)
            }
        }
    }
}

/// The `last_fired_at` value to record when `schedule` fires for the
/// occurrence `due_at`, observed at `now`.
///
/// Interval schedules advance by whole multiples of the interval so missed
/// occurrences collapse into one fire without breaking the cadence
/// (catch-up-by-one); the other types anchor the next computation at `now`.
pub fn advance_last_fired(schedule: &Schedule, due_at: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    match &schedule.spec {
        ScheduleSpec::Interval { seconds } => {
            let missed = (now - due_at).num_seconds() / *seconds as i64;
            due_at + Duration::seconds(missed * *seconds as i64)
        }
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn interval_schedule(seconds: u64, created_at: DateTime<Utc>) -> Schedule {
        let mut s = Schedule::new("i", "a", ScheduleSpec::Interval { seconds });
        s.created_at = created_at;
        s
    }

    #[test]
    fn interval_first_fire_is_creation_plus_interval() {
        let t0 = utc(2026, 1, 5, 12, 0, 0);
        let s = interval_schedule(30, t0);
        assert_eq!(next_fire(&s, t0), Some(t0 + Duration::seconds(30)));
    }

    #[test]
    fn interval_fires_from_last_fired_not_reference() {
        let t0 = utc(2026, 1, 5, 12, 0, 0);
        let mut s = interval_schedule(60, t0);
        s.last_fired_at = Some(t0 + Duration::seconds(600));
        // Reference a little after the last fire: next is anchored to it.
        let reference = t0 + Duration::seconds(610);
        assert_eq!(next_fire(&s, reference), Some(t0 + Duration::seconds(660)));
    }

    #[test]
    fn interval_next_stays_on_cadence_after_gap() {
        let t0 = utc(2026, 1, 5, 12, 0, 0);
        let mut s = interval_schedule(5, t0);
        s.last_fired_at = Some(t0);
        // Reference far past several missed occurrences.
        let reference = t0 + Duration::seconds(23);
        let next = next_fire(&s, reference).unwrap();
        assert!(next > reference);
        assert_eq!((next - t0).num_seconds() % 5, 0);
        assert_eq!(next, t0 + Duration::seconds(25));
    }

    #[test]
    fn cron_fires_in_schedule_timezone() {
        let mut s = Schedule::new("c", "a", ScheduleSpec::Cron { expression: "0 10 * * *".into() });
        s.timezone = "America/New_York".into();
        // January: EST, UTC-5, so 10:00 local is 15:00 UTC.
        let reference = utc(2026, 1, 15, 12, 0, 0);
        assert_eq!(next_fire(&s, reference), Some(utc(2026, 1, 15, 15, 0, 0)));
    }

    #[test]
    fn cron_result_is_strictly_after_reference() {
        let s = Schedule::new("c", "a", ScheduleSpec::Cron { expression: "0 * * * *".into() });
        // Reference exactly on a fire instant: next is the following hour.
        let reference = utc(2026, 1, 15, 10, 0, 0);
        assert_eq!(next_fire(&s, reference), Some(utc(2026, 1, 15, 11, 0, 0)));
    }

    #[test]
    fn cron_does_not_skip_an_occurrence_one_second_ahead() {
        let s = Schedule::new("c", "a", ScheduleSpec::Cron { expression: "* * * * *".into() });
        // The previous fire landed in the final second of the minute; the
        // very next minute boundary must still be found.
        let reference = utc(2026, 1, 15, 10, 0, 59);
        assert_eq!(next_fire(&s, reference), Some(utc(2026, 1, 15, 10, 1, 0)));
    }

    #[test]
    fn weekday_picks_earliest_matching_day() {
        // Monday at 09:00 UTC; reference is Wednesday 2026-01-14.
        let s = Schedule::new("w", "a", ScheduleSpec::Weekday { days: vec![1], time: "09:00".into() });
        let reference = utc(2026, 1, 14, 12, 0, 0);
        assert_eq!(next_fire(&s, reference), Some(utc(2026, 1, 19, 9, 0, 0)));
    }

    #[test]
    fn weekday_same_day_when_time_still_ahead() {
        // 2026-01-19 is a Monday.
        let s = Schedule::new("w", "a", ScheduleSpec::Weekday { days: vec![1], time: "09:00".into() });
        let reference = utc(2026, 1, 19, 8, 0, 0);
        assert_eq!(next_fire(&s, reference), Some(utc(2026, 1, 19, 9, 0, 0)));
    }

    #[test]
    fn weekday_skips_nonexistent_spring_forward_time() {
        // US DST starts 2026-03-08 (a Sunday): 02:30 local does not exist
        // that day, so the fire moves to Monday 02:30 EDT.
        let mut s = Schedule::new(
            "w",
            "a",
            ScheduleSpec::Weekday { days: vec![0, 1, 2, 3, 4, 5, 6], time: "02:30".into() },
        );
        s.timezone = "America/New_York".into();
        let reference = utc(2026, 3, 8, 5, 0, 0); // midnight EST
        assert_eq!(next_fire(&s, reference), Some(utc(2026, 3, 9, 6, 30, 0)));
    }

    #[test]
    fn weekday_fires_once_on_first_of_ambiguous_fall_back_time() {
        // US DST ends 2026-11-01 (a Sunday): 01:30 local happens twice that
        // morning. The fire lands on the first (EDT) occurrence.
        let mut s = Schedule::new(
            "w",
            "a",
            ScheduleSpec::Weekday { days: vec![0], time: "01:30".into() },
        );
        s.timezone = "America/New_York".into();
        let first = utc(2026, 11, 1, 5, 30, 0); // 01:30 EDT
        assert_eq!(next_fire(&s, utc(2026, 11, 1, 0, 0, 0)), Some(first));
        // The repeated 01:30 EST an hour later is not a second fire; the
        // next occurrence is the following Sunday.
        assert_eq!(next_fire(&s, first), Some(utc(2026, 11, 8, 6, 30, 0)));
    }

    #[test]
    fn once_returns_instant_until_fired() {
        let at = utc(2026, 6, 1, 0, 0, 0);
        let mut s = Schedule::new("o", "a", ScheduleSpec::Once { at });
        assert_eq!(next_fire(&s, at - Duration::hours(1)), Some(at));
        s.last_fired_at = Some(at);
        assert_eq!(next_fire(&s, at + Duration::hours(1)), None);
        assert_eq!(next_fire(&s, at - Duration::hours(1)), None);
    }

    #[test]
    fn recurring_next_fire_is_always_future() {
        let now = utc(2026, 4, 10, 17, 33, 21);
        let specs = [
            ScheduleSpec::Cron { expression: "*/7 * * * *".into() },
            ScheduleSpec::Interval { seconds: 45 },
            ScheduleSpec::Weekday { days: vec![2, 5], time: "23:15".into() },
        ];
        for spec in specs {
            let mut s = Schedule::new("p", "a", spec);
            s.created_at = now - Duration::days(30);
            s.last_fired_at = Some(now - Duration::days(3));
            let next = next_fire(&s, now).unwrap();
            assert!(next > now, "{} produced {next}", s.spec);
        }
    }

    #[test]
    fn advance_keeps_interval_cadence() {
        let t0 = utc(2026, 1, 5, 12, 0, 0);
        let s = interval_schedule(5, t0);
        // On time: record the occurrence itself.
        assert_eq!(advance_last_fired(&s, t0, t0 + Duration::seconds(1)), t0);
        // 23s late: collapse the missed occurrences onto the cadence.
        assert_eq!(
            advance_last_fired(&s, t0, t0 + Duration::seconds(23)),
            t0 + Duration::seconds(20)
        );
    }

    #[test]
    fn advance_uses_now_for_cron() {
        let s = Schedule::new("c", "a", ScheduleSpec::Cron { expression: "0 * * * *".into() });
        let due = utc(2026, 1, 15, 10, 0, 0);
        let now = utc(2026, 1, 15, 13, 7, 2);
        assert_eq!(advance_last_fired(&s, due, now), now);
    }
}
