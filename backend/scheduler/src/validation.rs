//! Creation-time schedule validation.
//!
//! Malformed configuration is rejected here, before a schedule ever reaches
//! the engine; the calculator assumes pre-validated input and never errors.

use std::str::FromStr;

use chrono::NaiveTime;
use chrono_tz::Tz;

use runforge_core::{EngineError, Schedule, ScheduleSpec};

/// Upper bound on user-supplied durations (one year in seconds). Keeps the
/// arithmetic in the calculator and retry paths inside `i64` range.
const MAX_DURATION_SECS: u64 = 31_536_000;

/// Prefix a 5-field cron expression with a seconds field, which is what the
/// `cron` crate parses.
pub fn normalize_cron(expression: &str) -> String {
    format!("0 {}", expression.trim())
}

/// Validate a schedule definition. Called by the store on create/update.
pub fn validate_schedule(schedule: &Schedule) -> Result<(), EngineError> {
    if schedule.name.trim().is_empty() {
        return Err(EngineError::Validation("schedule name must not be empty".into()));
    }
    if schedule.action_id.trim().is_empty() {
        return Err(EngineError::Validation("schedule must reference an action".into()));
    }
    if schedule.max_concurrent < 1 {
        return Err(EngineError::Validation("max_concurrent must be >= 1".into()));
    }
    if !(1..=MAX_DURATION_SECS).contains(&schedule.timeout_seconds) {
        return Err(EngineError::Validation(format!(
            "timeout_seconds must be between 1 and {}",
            MAX_DURATION_SECS
        )));
    }
    if schedule.retry_delay_seconds > MAX_DURATION_SECS {
        return Err(EngineError::Validation(format!(
            "retry_delay_seconds must be at most {}",
            MAX_DURATION_SECS
        )));
    }
    if Tz::from_str(&schedule.timezone).is_err() {
        return Err(EngineError::Validation(format!(
            "unknown timezone '{}'",
            schedule.timezone
        )));
    }

    match &schedule.spec {
        ScheduleSpec::Cron { expression } => validate_cron(expression),
        ScheduleSpec::Interval { seconds } => {
            if !(1..=MAX_DURATION_SECS).contains(seconds) {
                return Err(EngineError::Validation(format!(
                    "interval_seconds must be between 1 and {}",
                    MAX_DURATION_SECS
                )));
            }
            Ok(())
        }
        ScheduleSpec::Weekday { days, time } => {
            if days.is_empty() {
                return Err(EngineError::Validation("weekday set must not be empty".into()));
            }
            if let Some(bad) = days.iter().find(|d| **d > 6) {
                return Err(EngineError::Validation(format!(
                    "weekday {} out of range 0-6",
                    bad
                )));
            }
            NaiveTime::parse_from_str(time, "%H:%M").map_err(|_| {
                EngineError::Validation(format!("'{}' is not a valid HH:MM time", time))
            })?;
            Ok(())
        }
        ScheduleSpec::Once { .. } => Ok(()),
    }
}

/// Validate a standard 5-field cron expression.
fn validate_cron(expression: &str) -> Result<(), EngineError> {
    let fields = expression.split_whitespace().count();
    if fields != 5 {
        return Err(EngineError::Validation(format!(
            "cron expression must have exactly 5 fields, got {}: '{}'",
            fields, expression
        )));
    }
    cron::Schedule::from_str(&normalize_cron(expression))
        .map_err(|e| EngineError::Validation(format!("bad cron expression '{}': {}", expression, e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule_with(spec: ScheduleSpec) -> Schedule {
        Schedule::new("job", "action.run", spec)
    }

    #[test]
    fn accepts_standard_cron() {
        let s = schedule_with(ScheduleSpec::Cron { expression: "*/15 2-4 * * 1-5".into() });
        assert!(validate_schedule(&s).is_ok());
    }

    #[test]
    fn rejects_six_field_cron() {
        let s = schedule_with(ScheduleSpec::Cron { expression: "0 0 10 * * *".into() });
        assert!(matches!(validate_schedule(&s), Err(EngineError::Validation(_))));
    }

    #[test]
    fn rejects_garbage_cron() {
        let s = schedule_with(ScheduleSpec::Cron { expression: "not a cron at all!".into() });
        assert!(validate_schedule(&s).is_err());
    }

    #[test]
    fn rejects_empty_weekday_set() {
        let s = schedule_with(ScheduleSpec::Weekday { days: vec![], time: "09:00".into() });
        assert!(validate_schedule(&s).is_err());
    }

    #[test]
    fn rejects_weekday_out_of_range() {
        let s = schedule_with(ScheduleSpec::Weekday { days: vec![1, 7], time: "09:00".into() });
        assert!(validate_schedule(&s).is_err());
    }

    #[test]
    fn rejects_bad_time_format() {
        let s = schedule_with(ScheduleSpec::Weekday { days: vec![1], time: "9am".into() });
        assert!(validate_schedule(&s).is_err());
    }

    #[test]
    fn rejects_zero_interval() {
        let s = schedule_with(ScheduleSpec::Interval { seconds: 0 });
        assert!(validate_schedule(&s).is_err());
    }

    #[test]
    fn rejects_oversized_interval() {
        let s = schedule_with(ScheduleSpec::Interval { seconds: u64::MAX });
        assert!(validate_schedule(&s).is_err());
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut s = schedule_with(ScheduleSpec::Interval { seconds: 60 });
        s.timeout_seconds = 0;
        assert!(validate_schedule(&s).is_err());
    }

    #[test]
    fn rejects_oversized_timeout_and_retry_delay() {
        let mut s = schedule_with(ScheduleSpec::Interval { seconds: 60 });
        s.timeout_seconds = u64::MAX;
        assert!(validate_schedule(&s).is_err());
        s.timeout_seconds = 300;
        s.retry_delay_seconds = u64::MAX;
        assert!(validate_schedule(&s).is_err());
    }

    #[test]
    fn rejects_unknown_timezone() {
        let mut s = schedule_with(ScheduleSpec::Interval { seconds: 60 });
        s.timezone = "Mars/Olympus_Mons".into();
        assert!(validate_schedule(&s).is_err());
    }

    #[test]
    fn rejects_zero_max_concurrent() {
        let mut s = schedule_with(ScheduleSpec::Interval { seconds: 60 });
        s.max_concurrent = 0;
        assert!(validate_schedule(&s).is_err());
    }
}
