//! Recurrence generation for dosing schedules.
//!
//! Produces the ordered sequence of expected dose instants for a schedule,
//! bounded by a half-open time window. Stepping is a fixed elapsed-seconds
//! interval, so successive instances are always exactly `frequency_hours`
//! apart regardless of wall-clock transitions inside the schedule.

use crate::types::{truncate_to_minute, Schedule};
use chrono::{DateTime, Duration, Utc};

/// Lazy, restartable iterator over a schedule's expected dose instants.
///
/// Finite: bounded by `duration_days * 24 / frequency_hours` instances.
#[derive(Clone, Debug)]
pub struct DoseTimes {
    next: Option<DateTime<Utc>>,
    interval: Duration,
    window_end: DateTime<Utc>,
    schedule_end: DateTime<Utc>,
}

impl Iterator for DoseTimes {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<DateTime<Utc>> {
        let current = self.next?;
        if current >= self.window_end || current >= self.schedule_end {
            self.next = None;
            return None;
        }
        self.next = current.checked_add_signed(self.interval);
        Some(current)
    }
}

/// Generate dose instants for `schedule` within `[window_start, window_end)`.
///
/// The anchor is normalized to zero seconds. When the window starts after the
/// anchor, the first candidate is found by stepping forward a whole number of
/// intervals in one jump rather than iterating from the anchor, so schedules
/// anchored months in the past stay O(1) to position.
///
/// Degenerate schedules (non-positive frequency or duration) yield an empty
/// sequence, never an error.
pub fn dose_times(
    schedule: &Schedule,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> DoseTimes {
    let empty = DoseTimes {
        next: None,
        interval: Duration::zero(),
        window_end,
        schedule_end: window_end,
    };

    if !schedule.generates_instances() {
        return empty;
    }

    let anchor = truncate_to_minute(schedule.anchor_time);
    let interval_secs = schedule.frequency_hours.saturating_mul(3600);
    let interval = Duration::seconds(interval_secs);

    let first = if anchor >= window_start {
        anchor
    } else {
        let gap = (window_start - anchor).num_seconds();
        let steps = (gap + interval_secs - 1).div_euclid(interval_secs);
        match anchor.checked_add_signed(Duration::seconds(steps.saturating_mul(interval_secs))) {
            Some(t) => t,
            None => return empty,
        }
    };

    DoseTimes {
        next: Some(first),
        interval,
        window_end,
        schedule_end: schedule.end_time(),
    }
}

/// Collect the dose instants for `schedule` within `[window_start, window_end)`
pub fn expected_times(
    schedule: &Schedule,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    dose_times(schedule, window_start, window_end).collect()
}

/// All dose instants over the schedule's full lifetime, `[anchor, end)`.
///
/// Progress is defined over this window, not over a "now"-bounded one.
pub fn full_course_times(schedule: &Schedule) -> Vec<DateTime<Utc>> {
    let anchor = truncate_to_minute(schedule.anchor_time);
    expected_times(schedule, anchor, schedule.end_time())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn schedule(freq: i64, days: i64) -> Schedule {
        let anchor = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        Schedule::new(anchor, freq, days)
    }

    #[test]
    fn test_8h_for_one_day_yields_three_instances() {
        let s = schedule(8, 1);
        let window_end = s.anchor_time + Duration::days(2);
        let times = expected_times(&s, s.anchor_time, window_end);

        assert_eq!(times.len(), 3);
        assert_eq!(times[0], Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap());
        assert_eq!(times[1], Utc.with_ymd_and_hms(2024, 3, 1, 16, 0, 0).unwrap());
        assert_eq!(times[2], Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_instances_exactly_frequency_apart() {
        let s = schedule(6, 3);
        let times = full_course_times(&s);
        assert!(!times.is_empty());
        for pair in times.windows(2) {
            assert_eq!((pair[1] - pair[0]).num_seconds(), 6 * 3600);
        }
    }

    #[test]
    fn test_fast_forward_lands_on_or_after_window_start() {
        // Anchor far in the past relative to the queried window
        let anchor = Utc.with_ymd_and_hms(2023, 1, 1, 7, 30, 0).unwrap();
        let s = Schedule::new(anchor, 8, 500);
        let window_start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let window_end = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();

        let times = expected_times(&s, window_start, window_end);
        assert!(!times.is_empty());
        assert!(times[0] >= window_start);
        // One interval earlier would fall before the window
        assert!(times[0] - s.dose_interval() < window_start);
        assert_eq!(times.len(), 3);
    }

    #[test]
    fn test_window_is_half_open() {
        let s = schedule(8, 2);
        let window_end = Utc.with_ymd_and_hms(2024, 3, 1, 16, 0, 0).unwrap();
        let times = expected_times(&s, s.anchor_time, window_end);
        // 16:00 is excluded
        assert_eq!(times.len(), 1);
        assert_eq!(times[0], s.anchor_time);
    }

    #[test]
    fn test_schedule_end_is_exclusive() {
        // anchor + 24h lands exactly on the schedule end and is not generated
        let s = schedule(8, 1);
        let window_end = s.anchor_time + Duration::days(30);
        let times = expected_times(&s, s.anchor_time, window_end);
        assert_eq!(times.len(), 3);
        assert!(times.iter().all(|t| *t < s.end_time()));
    }

    #[test]
    fn test_degenerate_schedules_yield_empty() {
        let window_end = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        let zero_freq = schedule(0, 1);
        let zero_days = schedule(8, 0);
        let negative = schedule(-8, 1);

        assert!(expected_times(&zero_freq, zero_freq.anchor_time, window_end).is_empty());
        assert!(expected_times(&zero_days, zero_days.anchor_time, window_end).is_empty());
        assert!(expected_times(&negative, negative.anchor_time, window_end).is_empty());
    }

    #[test]
    fn test_anchor_seconds_are_normalized() {
        let anchor = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 42).unwrap();
        let s = Schedule::new(anchor, 12, 1);
        let times = full_course_times(&s);
        assert_eq!(times[0], Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_iterator_is_restartable() {
        let s = schedule(8, 1);
        let window_end = s.anchor_time + Duration::days(2);
        let first_pass: Vec<_> = dose_times(&s, s.anchor_time, window_end).collect();
        let second_pass: Vec<_> = dose_times(&s, s.anchor_time, window_end).collect();
        assert_eq!(first_pass, second_pass);
    }
}
