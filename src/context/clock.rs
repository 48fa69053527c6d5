//! Wall-clock helpers. Everything here is a pure function of `now` and config,
//! so snapshots stay reproducible in tests.

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, NaiveTime, Timelike, Utc};

use crate::error::EngineError;

use super::snapshot::TimeOfDay;

/// Local wall-clock time for `now`. A configured offset wins over the host zone.
pub fn local_naive(now: DateTime<Utc>, utc_offset_minutes: Option<i32>) -> NaiveDateTime {
    match utc_offset_minutes.and_then(|minutes| FixedOffset::east_opt(minutes.saturating_mul(60))) {
        Some(offset) => now.with_timezone(&offset).naive_local(),
        None => now.with_timezone(&Local).naive_local(),
    }
}

pub fn parse_hhmm(value: &str) -> Result<NaiveTime, EngineError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|err| EngineError::config(format!("invalid time '{value}' (expected HH:MM): {err}")))
}

pub fn time_of_day(time: NaiveTime) -> TimeOfDay {
    match time.hour() {
        5..=11 => TimeOfDay::Morning,
        12..=16 => TimeOfDay::Afternoon,
        17..=20 => TimeOfDay::Evening,
        _ => TimeOfDay::Night,
    }
}

/// Inclusive on both ends; a window with `start > end` wraps past midnight.
pub fn within_window(time: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start <= end {
        start <= time && time <= end
    } else {
        time >= start || time <= end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn day_segments_follow_hour_boundaries() {
        assert_eq!(time_of_day(at(4, 59)), TimeOfDay::Night);
        assert_eq!(time_of_day(at(5, 0)), TimeOfDay::Morning);
        assert_eq!(time_of_day(at(12, 0)), TimeOfDay::Afternoon);
        assert_eq!(time_of_day(at(17, 0)), TimeOfDay::Evening);
        assert_eq!(time_of_day(at(21, 0)), TimeOfDay::Night);
    }

    #[test]
    fn work_window_is_inclusive_and_wraps_overnight() {
        assert!(within_window(at(9, 0), at(9, 0), at(17, 0)));
        assert!(within_window(at(17, 0), at(9, 0), at(17, 0)));
        assert!(!within_window(at(17, 1), at(9, 0), at(17, 0)));

        assert!(within_window(at(23, 0), at(22, 0), at(6, 0)));
        assert!(within_window(at(5, 0), at(22, 0), at(6, 0)));
        assert!(!within_window(at(12, 0), at(22, 0), at(6, 0)));
    }

    #[test]
    fn parse_hhmm_rejects_garbage() {
        assert_eq!(parse_hhmm("09:30").unwrap(), at(9, 30));
        assert!(parse_hhmm("25:00").is_err());
        assert!(parse_hhmm("nine").is_err());
    }
}
